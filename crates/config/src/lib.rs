pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load, load_default};
pub use schema::{ClientConfig, Endpoints, TransportConfig, WxgateConfig};
