pub mod auth;
pub mod cms;
pub mod common;
pub mod orders;
pub mod payments;
pub mod products;
pub mod promotions;
pub mod returns;
pub mod reviews;
pub mod tickets;
pub mod users;
pub mod webhooks;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::services::{
    catalog::CatalogService, cms::CmsService, orders::OrderService, payments::PaymentService,
    promotions::PromotionService, returns::ReturnService, reviews::ReviewService,
    tickets::TicketService, users::UserService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cms: Arc<CmsService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub promotions: Arc<PromotionService>,
    pub returns: Arc<ReturnService>,
    pub reviews: Arc<ReviewService>,
    pub tickets: Arc<TicketService>,
    pub users: Arc<UserService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        auth: Arc<AuthService>,
        config: &AppConfig,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            gateway.clone(),
            event_sender.clone(),
            config.commerce.clone(),
            config.razorpay.key_id.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            gateway.clone(),
            event_sender.clone(),
            &config.razorpay,
        ));
        let returns = Arc::new(ReturnService::new(
            db.clone(),
            gateway,
            event_sender.clone(),
            config.commerce.return_window_days,
        ));
        let reviews = Arc::new(ReviewService::new(
            db.clone(),
            catalog.clone(),
            orders.clone(),
        ));

        Self {
            cms: Arc::new(CmsService::new(db.clone())),
            promotions: Arc::new(PromotionService::new(db.clone())),
            tickets: Arc::new(TicketService::new(db.clone(), event_sender)),
            users: Arc::new(UserService::new(db, auth, catalog.clone())),
            catalog,
            orders,
            payments,
            returns,
            reviews,
        }
    }
}
