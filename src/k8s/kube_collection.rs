/**
 * Kubernetes-backed resource collection over `Api<DynamicObject>`
 */
use super::cache::config::KubeCollectionConfig;
use super::client;
use super::collection::{EventStream, ObjectEvent, ResourceCollection, Scope, Snapshot};
use super::definition::{DefinitionRegistry, ResourceDefinition};
use super::object::{ObjectKey, Version};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams, WatchEvent, WatchParams,
};
use kube::Client;
use std::sync::Arc;
use tracing::debug;

/// One Kubernetes collection type, accessed through the API server
#[derive(Clone)]
pub struct KubeCollection {
    client: Client,
    definition: ResourceDefinition,
    resource: ApiResource,
    config: KubeCollectionConfig,
}

impl KubeCollection {
    #[must_use]
    pub fn new(client: Client, definition: ResourceDefinition, config: KubeCollectionConfig) -> Self {
        Self {
            client,
            resource: definition.api_resource(),
            definition,
            config,
        }
    }

    #[must_use]
    pub const fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }

    #[must_use]
    pub const fn api_resource(&self) -> &ApiResource {
        &self.resource
    }

    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) if self.definition.namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &self.resource)
            }
            _ => Api::all_with(self.client.clone(), &self.resource),
        }
    }

    fn list_params(scope: &Scope) -> ListParams {
        match scope.label_selector.as_deref() {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        }
    }

    fn watch_params(&self, scope: &Scope) -> WatchParams {
        let wp = WatchParams::default().timeout(self.config.watch_timeout_secs);
        match scope.label_selector.as_deref() {
            Some(selector) => wp.labels(selector),
            None => wp,
        }
    }
}

/// Translates one raw watch item into the collection event model
fn map_watch_item(item: kube::Result<WatchEvent<DynamicObject>>) -> Result<ObjectEvent<DynamicObject>> {
    match item {
        Ok(WatchEvent::Added(object)) => Ok(ObjectEvent::Added(object).checked()),
        Ok(WatchEvent::Modified(object)) => Ok(ObjectEvent::Modified(object).checked()),
        Ok(WatchEvent::Deleted(object)) => Ok(ObjectEvent::Deleted(object).checked()),
        Ok(WatchEvent::Bookmark(bookmark)) => Ok(ObjectEvent::Bookmark(Version::from(
            bookmark.metadata.resource_version,
        ))),
        Ok(WatchEvent::Error(status)) if status.code == 410 => Err(Error::Expired(status.message)),
        Ok(WatchEvent::Error(status)) => Err(Error::Transport(format!(
            "{} ({}): {}",
            status.reason, status.code, status.message
        ))),
        // `WatchEvent` is tagged by its `type` field, so an unrecognised event type decodes
        // as a serde_json data error; truncated lines are eof errors and never reach here
        Err(kube::Error::SerdeError(e)) if e.is_data() => Err(Error::MalformedEvent(e.to_string())),
        Err(e) => Err(Error::Kube(e)),
    }
}

#[async_trait]
impl ResourceCollection for KubeCollection {
    type Object = DynamicObject;

    fn describe(&self) -> String {
        self.definition.to_string()
    }

    async fn list(&self, scope: &Scope) -> Result<Snapshot<DynamicObject>> {
        let list = self
            .api(scope.namespace.as_deref())
            .list(&Self::list_params(scope))
            .await?;
        let version = list.metadata.resource_version.clone().map(Version::from);
        Ok(Snapshot::from_items(list.items, version))
    }

    async fn watch(
        &self,
        scope: &Scope,
        from_version: Option<&Version>,
    ) -> Result<EventStream<DynamicObject>> {
        let version = from_version.map_or("0", Version::as_str);
        debug!("Opening watch on {} from {}", self.definition, version);
        let stream = self
            .api(scope.namespace.as_deref())
            .watch(&self.watch_params(scope), version)
            .await?;
        Ok(stream.map(map_watch_item).boxed())
    }

    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject> {
        Ok(self.api(key.namespace.as_deref()).get(&key.name).await?)
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject> {
        Ok(self
            .api(object.metadata.namespace.as_deref())
            .create(&PostParams::default(), object)
            .await?)
    }

    async fn replace(&self, object: &DynamicObject, precondition: &Version) -> Result<DynamicObject> {
        let mut guarded = object.clone();
        guarded.metadata.resource_version = Some(precondition.to_string());
        let name = guarded.metadata.name.clone().unwrap_or_default();
        match self
            .api(guarded.metadata.namespace.as_deref())
            .replace(&name, &PostParams::default(), &guarded)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(resp)) if resp.code == 409 => Err(Error::Conflict(resp.message)),
            Err(e) => Err(Error::Kube(e)),
        }
    }

    async fn delete(&self, key: &ObjectKey) -> Result<Option<DynamicObject>> {
        let outcome = self
            .api(key.namespace.as_deref())
            .delete(&key.name, &DeleteParams::default())
            .await?;
        Ok(outcome.left())
    }
}

/// Builds collections for registered definitions from one shared client
#[derive(Clone)]
pub struct CollectionFactory {
    client: Client,
    config: KubeCollectionConfig,
}

impl CollectionFactory {
    #[must_use]
    pub const fn new(client: Client, config: KubeCollectionConfig) -> Self {
        Self { client, config }
    }

    /// Creates a factory with a client inferred from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if K8s client creation fails, or with `strict_user_agent` if the user
    /// agent is not a valid header value
    pub async fn infer(
        config: KubeCollectionConfig,
        user_agent: Option<&str>,
        strict_user_agent: bool,
    ) -> Result<Self> {
        let client = if strict_user_agent {
            client::new_strict(user_agent).await?
        } else {
            client::new(user_agent).await?
        };
        Ok(Self::new(client, config))
    }

    #[must_use]
    pub fn collection(&self, definition: &ResourceDefinition) -> Arc<KubeCollection> {
        Arc::new(KubeCollection::new(
            self.client.clone(),
            definition.clone(),
            self.config.clone(),
        ))
    }

    /// # Errors
    ///
    /// Returns `NotFound` if `kind` is not registered
    pub fn collection_for_kind(
        &self,
        registry: &DefinitionRegistry,
        kind: &str,
    ) -> Result<Arc<KubeCollection>> {
        registry
            .get(kind)
            .map(|definition| self.collection(definition))
            .ok_or_else(|| Error::NotFound(format!("no definition registered for kind {kind}")))
    }
}
