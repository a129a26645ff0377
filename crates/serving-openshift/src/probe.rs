//! Detection of OpenShift clusters.
//!
//! OpenShift serves the `route.openshift.io/v1` API group, vanilla Kubernetes does not. Listing
//! routes is therefore enough to tell both apart.
use async_trait::async_trait;
use kube::{
    Api, Client,
    api::ListParams,
    core::{ApiResource, DynamicObject, GroupVersionKind},
};
use snafu::Snafu;

pub const ROUTE_GROUP: &str = "route.openshift.io";
pub const ROUTE_VERSION: &str = "v1";
pub const ROUTE_KIND: &str = "Route";
pub const ROUTE_PLURAL: &str = "routes";

/// HTTP status code returned by the API server for an unknown resource type.
const NOT_FOUND: u16 = 404;

#[derive(Debug, Snafu)]
pub enum ProbeError {
    #[snafu(display("the API server does not serve {ROUTE_PLURAL}.{ROUTE_GROUP}/{ROUTE_VERSION}"))]
    NoMatchingKind { source: kube::Error },

    #[snafu(display("failed to list {ROUTE_PLURAL}.{ROUTE_GROUP}/{ROUTE_VERSION}"))]
    ListRoutes { source: kube::Error },
}

impl From<kube::Error> for ProbeError {
    fn from(source: kube::Error) -> Self {
        match source {
            kube::Error::Api(ref status) if status.code == NOT_FOUND => {
                Self::NoMatchingKind { source }
            }
            source => Self::ListRoutes { source },
        }
    }
}

/// Lists OpenShift routes across all namespaces.
///
/// Only success or failure of the call matters, the returned items are discarded.
#[async_trait]
pub trait RouteLister: Send + Sync {
    async fn list_routes(&self) -> Result<(), kube::Error>;
}

/// Returns the [`ApiResource`] of OpenShift routes.
pub fn route_api_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk(ROUTE_GROUP, ROUTE_VERSION, ROUTE_KIND);
    ApiResource::from_gvk_with_plural(&gvk, ROUTE_PLURAL)
}

#[async_trait]
impl RouteLister for Client {
    async fn list_routes(&self) -> Result<(), kube::Error> {
        let api_resource = route_api_resource();
        let routes: Api<DynamicObject> = Api::all_with(self.clone(), &api_resource);

        let list = routes.list(&ListParams::default().limit(1)).await?;
        tracing::debug!(routes.count = list.items.len(), "listed routes");

        Ok(())
    }
}

/// Returns `true` if the cluster behind `lister` serves OpenShift routes.
///
/// Errors are never propagated. A cluster without the route API is reported at info level,
/// any other failure at error level. Both result in `false`.
#[tracing::instrument(skip_all)]
pub async fn running_on_openshift(lister: &impl RouteLister) -> bool {
    match lister.list_routes().await.map_err(ProbeError::from) {
        Ok(()) => {
            tracing::info!("OpenShift detected");
            true
        }
        Err(error @ ProbeError::NoMatchingKind { .. }) => {
            tracing::info!(%error, "OpenShift not detected");
            false
        }
        Err(error) => {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "failed to detect OpenShift"
            );
            false
        }
    }
}
