pub mod airdrop;
pub mod context;
pub mod dex;
pub mod error;
pub mod jacuzzi;
pub mod tokens;
pub mod types;
pub mod utils;
pub mod yay;


pub use context::{DexContext, DexContracts};
pub use dex::DexService;
pub use error::ServiceError;
pub use tokens::TokenRegistry;
pub use types::*;

pub(crate) type ServiceResult<T> = std::result::Result<T, ServiceError>;
