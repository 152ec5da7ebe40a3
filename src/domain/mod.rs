pub mod element;
pub mod order;
pub mod user;
