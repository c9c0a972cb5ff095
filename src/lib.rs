pub mod app;
pub mod config;
pub mod middleware;
pub mod multicall;
pub mod repository;
pub mod service;
pub mod session;
pub mod transactions;

pub use app::{build_app, connect_repository, open_session};

// Re-export commonly used types for tests
pub use service::{
    AccountRequest, AmountRequest, DexContext, DexService, GetCallStatusRequest,
    SwitchAccountRequest, TokenBalanceRequest, TokenRegistry,
};
pub use session::{Session, SessionKey, SessionSettings, driver::SessionDriver};
