mod chain;
mod health;
pub mod models;
mod status;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(status::status_page).service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::get_block_at)
            .service(chain::get_peers)
            .service(chain::post_sync),
    );
}
