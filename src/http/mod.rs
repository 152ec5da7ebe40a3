pub mod auth;
pub mod catalog;
pub mod orders;
pub mod users;

use actix_web::web;

use crate::metrics;

/// All route wiring in one place. Paths mirror the REST surface: catalog
/// CRUD under /components, lifecycle operations under /orders, identity
/// under /users and /session.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/components")
            .route(web::get().to(catalog::list_components))
            .route(web::post().to(catalog::create_component)),
    )
    .service(
        web::resource("/components/{id}")
            .route(web::get().to(catalog::get_component))
            .route(web::put().to(catalog::update_component))
            .route(web::delete().to(catalog::delete_component)),
    )
    .service(web::resource("/components/{id}/image").route(web::post().to(catalog::upload_image)))
    .service(
        web::resource("/components/{id}/add").route(web::post().to(catalog::add_to_formulation)),
    )
    .service(web::resource("/orders").route(web::get().to(orders::list_orders)))
    .service(
        web::resource("/orders/{id}")
            .route(web::get().to(orders::get_order))
            .route(web::put().to(orders::update_order))
            .route(web::delete().to(orders::discard_order)),
    )
    .service(web::resource("/orders/{id}/form").route(web::put().to(orders::form_order)))
    .service(web::resource("/orders/{id}/resolve").route(web::put().to(orders::resolve_order)))
    .service(
        web::resource("/orders/{id}/adverse_effects")
            .route(web::put().to(orders::set_adverse_effects)),
    )
    .service(
        web::resource("/orders/{order_id}/components/{element_id}")
            .route(web::put().to(orders::update_component_dosage))
            .route(web::delete().to(orders::remove_component)),
    )
    .service(web::resource("/users").route(web::post().to(users::register)))
    .service(web::resource("/users/me").route(web::put().to(users::update_me)))
    .service(
        web::resource("/session")
            .route(web::post().to(users::login))
            .route(web::delete().to(users::logout)),
    )
    .service(web::resource("/health").route(web::get().to(metrics::health_handler)))
    .service(web::resource("/metrics").route(web::get().to(metrics::metrics_handler)));
}
