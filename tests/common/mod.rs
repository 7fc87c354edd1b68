#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use kubemirror::error::{Error, Result};
use kubemirror::k8s::collection::{EventStream, ObjectEvent, ResourceCollection, Scope, Snapshot};
use kubemirror::k8s::object::{ManagedObject, ObjectKey, Version};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestObject {
    pub key: ObjectKey,
    pub version: Option<Version>,
    pub payload: String,
}

impl TestObject {
    pub fn new(name: &str, version: &str, payload: &str) -> Self {
        Self {
            key: ObjectKey::namespaced(NAMESPACE, name),
            version: Some(Version::from(version)),
            payload: payload.to_string(),
        }
    }

    pub fn desired(name: &str, payload: &str) -> Self {
        Self {
            key: ObjectKey::namespaced(NAMESPACE, name),
            version: None,
            payload: payload.to_string(),
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.key.namespace = Some(namespace.to_string());
        self
    }

    pub fn nameless(version: &str) -> Self {
        Self {
            key: ObjectKey::namespaced(NAMESPACE, ""),
            version: Some(Version::from(version)),
            payload: String::new(),
        }
    }
}

impl ManagedObject for TestObject {
    fn key(&self) -> ObjectKey {
        self.key.clone()
    }

    fn version(&self) -> Option<Version> {
        self.version.clone()
    }

    fn payload_eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

/// A write request the fake collection received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Create(ObjectKey),
    Replace(ObjectKey, Version),
    Delete(ObjectKey),
}

pub type WatchSender = mpsc::UnboundedSender<Result<ObjectEvent<TestObject>>>;

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, TestObject>,
    /// Items returned by `list` as-is, e.g. objects that fail validation
    raw_items: Vec<TestObject>,
    revision: u64,
    list_calls: usize,
    get_calls: usize,
    replace_calls: usize,
    ops: Vec<Op>,
    list_failures: VecDeque<Error>,
    conflicts_remaining: usize,
    failing_keys: HashSet<ObjectKey>,
    watch_origins: Vec<Option<Version>>,
    ignores_scope: bool,
}

/// In-memory collection with numeric versions and scripted failures.
///
/// Every successful write bumps a collection-wide revision counter, the same way a real API
/// server issues versions.
#[derive(Default)]
pub struct FakeCollection {
    state: Mutex<State>,
    watchers: Mutex<VecDeque<WatchSender>>,
    watch_opened: Notify,
}

impl FakeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(objects: Vec<TestObject>) -> Self {
        let fake = Self::new();
        fake.seed(objects);
        fake
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Replaces the stored objects, keeping their versions
    pub fn seed(&self, objects: Vec<TestObject>) {
        let mut state = self.state();
        state.objects.clear();
        for object in objects {
            if let Some(n) = object.version.as_ref().and_then(|v| v.as_str().parse::<u64>().ok()) {
                state.revision = state.revision.max(n);
            }
            state.objects.insert(object.key.clone(), object);
        }
    }

    pub fn add_raw_item(&self, item: TestObject) {
        self.state().raw_items.push(item);
    }

    pub fn fail_next_list(&self, error: Error) {
        self.state().list_failures.push_back(error);
    }

    /// The next `n` replaces fail with a conflict after another writer changed the object
    pub fn conflict_next_replaces(&self, n: usize) {
        self.state().conflicts_remaining = n;
    }

    /// Every write touching `key` fails with a transport error
    pub fn fail_writes_to(&self, key: ObjectKey) {
        self.state().failing_keys.insert(key);
    }

    /// `list` returns every stored object regardless of the requested scope
    pub fn ignore_scope(&self) {
        self.state().ignores_scope = true;
    }

    pub fn object(&self, key: &ObjectKey) -> Option<TestObject> {
        self.state().objects.get(key).cloned()
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn get_calls(&self) -> usize {
        self.state().get_calls
    }

    pub fn replace_calls(&self) -> usize {
        self.state().replace_calls
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state().ops.clone()
    }

    pub fn watch_origins(&self) -> Vec<Option<Version>> {
        self.state().watch_origins.clone()
    }

    /// Waits until a watch is opened and returns the sender feeding it
    pub async fn next_watch(&self) -> WatchSender {
        loop {
            if let Some(sender) = self.watchers.lock().unwrap().pop_front() {
                return sender;
            }
            self.watch_opened.notified().await;
        }
    }

    fn next_version(state: &mut State) -> Version {
        state.revision += 1;
        Version::new(state.revision.to_string())
    }

    fn check_writable(state: &State, key: &ObjectKey) -> Result<()> {
        if state.failing_keys.contains(key) {
            Err(Error::Transport(format!("write to {key} refused")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResourceCollection for FakeCollection {
    type Object = TestObject;

    fn describe(&self) -> String {
        "fake/testobjects".to_string()
    }

    async fn list(&self, scope: &Scope) -> Result<Snapshot<TestObject>> {
        let mut state = self.state();
        state.list_calls += 1;
        if let Some(error) = state.list_failures.pop_front() {
            return Err(error);
        }
        let mut items: Vec<TestObject> = state
            .objects
            .values()
            .filter(|o| state.ignores_scope || scope.contains_key(&o.key))
            .cloned()
            .collect();
        items.extend(state.raw_items.iter().cloned());
        let version = Version::new(state.revision.to_string());
        Ok(Snapshot::from_items(items, Some(version)))
    }

    async fn watch(
        &self,
        _scope: &Scope,
        from_version: Option<&Version>,
    ) -> Result<EventStream<TestObject>> {
        self.state().watch_origins.push(from_version.cloned());
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().unwrap().push_back(tx);
        self.watch_opened.notify_one();
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn get(&self, key: &ObjectKey) -> Result<TestObject> {
        let mut state = self.state();
        state.get_calls += 1;
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn create(&self, object: &TestObject) -> Result<TestObject> {
        let mut state = self.state();
        Self::check_writable(&state, &object.key)?;
        if state.objects.contains_key(&object.key) {
            return Err(Error::Conflict(format!("{} already exists", object.key)));
        }
        let mut created = object.clone();
        created.version = Some(Self::next_version(&mut state));
        state.ops.push(Op::Create(object.key.clone()));
        state.objects.insert(created.key.clone(), created.clone());
        Ok(created)
    }

    async fn replace(&self, object: &TestObject, precondition: &Version) -> Result<TestObject> {
        let mut state = self.state();
        state.replace_calls += 1;
        Self::check_writable(&state, &object.key)?;

        if state.conflicts_remaining > 0 {
            state.conflicts_remaining -= 1;
            let version = Self::next_version(&mut state);
            if let Some(stored) = state.objects.get_mut(&object.key) {
                stored.payload.push_str("+ext");
                stored.version = Some(version);
            }
            return Err(Error::Conflict(format!("{} was modified", object.key)));
        }

        let stored_version = state
            .objects
            .get(&object.key)
            .and_then(|o| o.version.clone())
            .ok_or_else(|| Error::NotFound(object.key.to_string()))?;
        if &stored_version != precondition {
            return Err(Error::Conflict(format!(
                "{} is at {stored_version}, not {precondition}",
                object.key
            )));
        }

        let mut replaced = object.clone();
        replaced.version = Some(Self::next_version(&mut state));
        state.ops.push(Op::Replace(object.key.clone(), precondition.clone()));
        state.objects.insert(replaced.key.clone(), replaced.clone());
        Ok(replaced)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<Option<TestObject>> {
        let mut state = self.state();
        Self::check_writable(&state, key)?;
        let removed = state.objects.remove(key);
        if removed.is_none() {
            return Err(Error::NotFound(key.to_string()));
        }
        state.ops.push(Op::Delete(key.clone()));
        Ok(removed)
    }
}

/// Builds an `Added` event
pub fn added(name: &str, version: &str, payload: &str) -> Result<ObjectEvent<TestObject>> {
    Ok(ObjectEvent::Added(TestObject::new(name, version, payload)))
}

/// Builds a `Modified` event
pub fn modified(name: &str, version: &str, payload: &str) -> Result<ObjectEvent<TestObject>> {
    Ok(ObjectEvent::Modified(TestObject::new(name, version, payload)))
}

/// Builds a `Deleted` event
pub fn deleted(name: &str, version: &str) -> Result<ObjectEvent<TestObject>> {
    Ok(ObjectEvent::Deleted(TestObject::new(name, version, "")))
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::namespaced(NAMESPACE, name)
}
