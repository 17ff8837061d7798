pub mod error;
pub mod observable;
pub mod services;
pub mod state;
pub mod store;
pub mod traits;
