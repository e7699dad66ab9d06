pub mod catalog;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod remote;
pub mod token_store;
pub mod processing {
    pub mod frame;
    pub mod layout;
}
pub mod tasks {
    pub mod slideshow;
    pub mod viewer;
}

pub use error::{Error, Result};
