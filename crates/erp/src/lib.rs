//! ERP integration over an SAP Business One Service Layer style API.
//!
//! - **Sessions** (`session`) - login, expiry and single-flight renewal per system
//! - **Transport** (`service_layer`) - `POST /Login` plus OData `GET`s carrying the session cookie
//! - **Registry** (`registry`) - business partners as [`CustomerRegistry`](mailquote_core::ports::CustomerRegistry)
//! - **Catalog** (`catalog`) - items and special prices as [`ProductCatalog`](mailquote_core::ports::ProductCatalog)
//!
//! ```text
//! pipeline -> ServiceLayerRegistry / ServiceLayerCatalog -> ServiceLayerClient -> SessionManager
//!                                                                  |                   |
//!                                                             OData GET            POST /Login
//! ```

pub mod catalog;
pub mod registry;
pub mod service_layer;
pub mod session;

use std::sync::Arc;

use mailquote_core::config::AppConfig;
use mailquote_core::ports::ExternalError;

pub use catalog::{PriceLists, ServiceLayerCatalog};
pub use registry::ServiceLayerRegistry;
pub use service_layer::ServiceLayerClient;
pub use session::{Authenticator, Session, SessionError, SessionGrant, SessionManager};

pub const REGISTRY_SYSTEM: &str = "registry";
pub const CATALOG_SYSTEM: &str = "catalog";

/// Builds the registry and catalog adapters, each with its own session.
pub fn connect(
    config: &AppConfig,
) -> Result<(ServiceLayerRegistry, ServiceLayerCatalog), ExternalError> {
    let registry = ServiceLayerClient::new(REGISTRY_SYSTEM, &config.registry)?;
    let catalog = ServiceLayerClient::new(CATALOG_SYSTEM, &config.catalog.service)?;
    let lists = PriceLists {
        sales: config.catalog.sales_price_list,
        purchase: config.catalog.purchase_price_list,
    };
    Ok((
        ServiceLayerRegistry::new(Arc::new(registry)),
        ServiceLayerCatalog::new(Arc::new(catalog), lists),
    ))
}
