pub use app_error::{AppError, AppResult};
pub use config::{ClientConfig, GeneralConfig, NetworkConfig, RemoteConfig, ServerConfig};
pub use registry::{HandlerRegistry, ServiceHandler, STATUS_OK, STATUS_UNKNOWN_MSG};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod registry;
mod shutdown;
mod tracing_config;
