pub mod config;
pub mod analytics {
    pub mod aggregator;
}
pub mod domain {
    pub mod error;
    pub mod money;
    pub mod order;
    pub mod payment;
    pub mod webhook;
}
pub mod gateways;
pub mod http {
    pub mod errors;
    pub mod routes;
    pub mod handlers {
        pub mod admin;
        pub mod ops;
        pub mod payments;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod admin_auth;
        pub mod rate_limit;
    }
}
pub mod lifecycle {
    pub mod projector;
    pub mod transitions;
}
pub mod repo {
    pub mod memory;
    pub mod orders_repo;
    pub mod outbox_repo;
    pub mod payments_repo;
    pub mod store;
    pub mod webhook_events_repo;
}
pub mod service {
    pub mod ledger_janitor;
    pub mod outbox_relay;
    pub mod payment_service;
    pub mod retry;
}

#[derive(Clone)]
pub struct AppState {
    pub payment_service: service::payment_service::PaymentService,
}
