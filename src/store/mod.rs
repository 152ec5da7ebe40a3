mod catalog;
mod orders;
mod users;

pub use catalog::CatalogStore;
pub use orders::{ComponentDetail, OrderFilter, OrderStore, OrderSummary};
pub use users::UserStore;
