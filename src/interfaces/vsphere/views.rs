use serde_json::{Value, json};
use tracing::{instrument, warn};

use crate::Error;
use crate::interfaces::vsphere::lowlevel::Vim;
use crate::interfaces::vsphere::types::{MoRef, ObjectContent, RetrieveResult};

/// A server-side view over every object of the given kinds below the root
/// folder. Must be destroyed when done, the server keeps it for the session.
pub struct ContainerView<'a> {
    vim: &'a Vim,
    view: MoRef,
}

impl<'a> ContainerView<'a> {
    #[instrument(skip(vim))]
    pub async fn create(vim: &'a Vim, kinds: &[&str]) -> Result<ContainerView<'a>, Error> {
        let content = vim.content();
        let view: MoRef = vim
            .invoke(
                &content.view_manager,
                "CreateContainerView",
                &json!({
                    "container": content.root_folder,
                    "type": kinds,
                    "recursive": true,
                }),
            )
            .await?;
        Ok(ContainerView { vim, view })
    }

    /// Fetch `properties` of every object of the given kinds in the view,
    /// following continuation tokens until the collector has returned everything.
    #[instrument(skip(self), fields(view = %self.view))]
    pub async fn retrieve(&self, kinds: &[&str], properties: &[&str]) -> Result<Vec<ObjectContent>, Error> {
        let collector = &self.vim.content().property_collector;
        let spec = property_filter_spec(&self.view, kinds, properties);

        let mut page: Option<RetrieveResult> = self
            .vim
            .invoke(
                collector,
                "RetrievePropertiesEx",
                &json!({"specSet": [spec], "options": {"_typeName": "RetrieveOptions"}}),
            )
            .await?;

        let mut objects = Vec::new();
        while let Some(result) = page {
            objects.extend(result.objects);
            page = match result.token {
                Some(token) => {
                    self.vim
                        .invoke(collector, "ContinueRetrievePropertiesEx", &json!({"token": token}))
                        .await?
                }
                None => None,
            };
        }
        Ok(objects)
    }

    pub async fn destroy(self) -> Result<(), Error> {
        self.vim.invoke_void(&self.view, "DestroyView", &json!({})).await
    }
}

fn property_filter_spec(view: &MoRef, kinds: &[&str], properties: &[&str]) -> Value {
    let prop_set: Vec<Value> = kinds
        .iter()
        .map(|kind| {
            json!({
                "_typeName": "PropertySpec",
                "type": kind,
                "pathSet": properties,
            })
        })
        .collect();

    json!({
        "_typeName": "PropertyFilterSpec",
        "propSet": prop_set,
        "objectSet": [{
            "_typeName": "ObjectSpec",
            "obj": view,
            "skip": true,
            "selectSet": [{
                "_typeName": "TraversalSpec",
                "name": "traverseEntities",
                "type": "ContainerView",
                "path": "view",
                "skip": false,
            }],
        }],
    })
}

/// Enumerate all objects of the given kinds below the root folder. Every kind
/// must carry every property in `properties`.
pub async fn list_objects(
    vim: &Vim,
    kinds: &[&str],
    properties: &[&str],
) -> Result<Vec<ObjectContent>, Error> {
    let view = ContainerView::create(vim, kinds).await?;
    let result = view.retrieve(kinds, properties).await;
    if let Err(e) = view.destroy().await {
        warn!("vsphere: failed to destroy container view: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::vsphere::testing::{logged_in, mock_container_view, API};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn follows_continuation_tokens_and_destroys_view() {
        let server = MockServer::start().await;
        let vim = logged_in(&server).await;
        mock_container_view(&server, "view-1").await;

        Mock::given(method("POST"))
            .and(path(format!("{API}/PropertyCollector/propertyCollector/RetrievePropertiesEx")))
            .and(body_partial_json(json!({"specSet": [{"propSet": [{"type": "VirtualMachine", "pathSet": ["name"]}]}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_typeName": "RetrieveResult",
                "objects": [{"obj": {"type": "VirtualMachine", "value": "vm-1"}, "propSet": [{"name": "name", "val": "a"}]}],
                "token": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{API}/PropertyCollector/propertyCollector/ContinueRetrievePropertiesEx")))
            .and(body_partial_json(json!({"token": "page-2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_typeName": "RetrieveResult",
                "objects": [{"obj": {"type": "VirtualMachine", "value": "vm-2"}, "propSet": [{"name": "name", "val": "b"}]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let objects = list_objects(&vim, &["VirtualMachine"], &["name"]).await.unwrap();
        let ids: Vec<&str> = objects.iter().map(|o| o.obj.value.as_str()).collect();
        assert_eq!(ids, vec!["vm-1", "vm-2"]);
    }

    #[tokio::test]
    async fn empty_inventory_yields_no_objects() {
        let server = MockServer::start().await;
        let vim = logged_in(&server).await;
        mock_container_view(&server, "view-1").await;
        Mock::given(method("POST"))
            .and(path(format!("{API}/PropertyCollector/propertyCollector/RetrievePropertiesEx")))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
            .mount(&server)
            .await;

        let objects = list_objects(&vim, &["VirtualMachine"], &["name"]).await.unwrap();
        assert!(objects.is_empty());
    }
}
