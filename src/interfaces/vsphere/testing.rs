//! Fixtures shared by the vSphere and controller tests

use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::Error;
use crate::interfaces::vsphere::inventory::InventoryLookup;
use crate::interfaces::vsphere::lowlevel::{SESSION_HEADER, Vim};
use crate::interfaces::vsphere::session::{SessionParams, VimSession};
use crate::interfaces::vsphere::types::MoRef;
use crate::interfaces::vsphere::vmgroup::VmGroup;

pub const API: &str = "/sdk/vim25/8.0.1.0";

mock! {
    pub Session {}

    #[async_trait]
    impl InventoryLookup for Session {
        async fn find_group(&self, cluster_path: &str, group_name: &str) -> Result<VmGroup, Error>;
        async fn find_vm(&self, vm_name: &str) -> Result<MoRef, Error>;
    }

    #[async_trait]
    impl VimSession for Session {
        async fn reconfigure_group(&self, group: &VmGroup) -> Result<MoRef, Error>;
        async fn logout(&self) -> Result<(), Error>;
    }
}

pub fn session_params(server: &MockServer) -> SessionParams {
    SessionParams::new(&format!("{}/sdk", server.uri()), "admin", "secret", true)
        .expect("mock server uri is a valid endpoint")
}

pub async fn mock_service_content(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{API}/ServiceInstance/ServiceInstance/content")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_typeName": "ServiceContent",
            "rootFolder": {"_typeName": "ManagedObjectReference", "type": "Folder", "value": "group-d1"},
            "propertyCollector": {"_typeName": "ManagedObjectReference", "type": "PropertyCollector", "value": "propertyCollector"},
            "viewManager": {"_typeName": "ManagedObjectReference", "type": "ViewManager", "value": "ViewManager"},
            "sessionManager": {"_typeName": "ManagedObjectReference", "type": "SessionManager", "value": "SessionManager"}
        })))
        .mount(server)
        .await;
}

/// Mount service content and an accepting login, then log in
pub async fn logged_in(server: &MockServer) -> Vim {
    mock_service_content(server).await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/SessionManager/SessionManager/Login")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(SESSION_HEADER, "test-session")
                .set_body_json(json!({"_typeName": "UserSession"})),
        )
        .mount(server)
        .await;
    Vim::login(&session_params(server))
        .await
        .expect("login against mock server")
}

/// CreateContainerView answering with `view_id`, which must be destroyed exactly once
pub async fn mock_container_view(server: &MockServer, view_id: &str) {
    Mock::given(method("POST"))
        .and(path(format!("{API}/ViewManager/ViewManager/CreateContainerView")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_typeName": "ManagedObjectReference", "type": "ContainerView", "value": view_id
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/ContainerView/{view_id}/DestroyView")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}
