//! Kubernetes API server backend.

mod convert;

use std::fmt::Debug;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use k8s_openapi::api::rbac::v1 as rbac;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use permit_types::{
    Binding, BindingKey, ClusterInfo, CsrConditionKind, CsrObject, ObjectKind, ObjectRef, Role,
    RoleKey, Scope,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::{
    CertificateApi, ConnectError, CreateOutcome, ListScope, ObjectStream, RbacStore, StoreError,
    StoreResult,
};

/// ConfigMap published into every namespace with the cluster CA bundle.
const ROOT_CA_CONFIG_MAP: &str = "kube-root-ca.crt";
const ROOT_CA_KEY: &str = "ca.crt";

/// How to reach and describe a live cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeSettings {
    /// Name written into generated connection profiles.
    pub cluster_name: String,
    /// Public API server URL handed to users. Defaults to the URL the
    /// engine itself connects to.
    pub endpoint: Option<String>,
    /// Kubeconfig context to use. `None` infers the configuration
    /// (in-cluster service account or the current context).
    pub context: Option<String>,
    /// CA bundle handed to users. Read from the cluster when absent.
    pub ca_pem: Option<String>,
    /// Namespace whose `kube-root-ca.crt` ConfigMap provides the CA.
    pub ca_config_map_namespace: String,
    /// Objects requested per listing page.
    pub page_size: u32,
}

impl Default for KubeSettings {
    fn default() -> Self {
        Self {
            cluster_name: "kubernetes".to_string(),
            endpoint: None,
            context: None,
            ca_pem: None,
            ca_config_map_namespace: "default".to_string(),
            page_size: 100,
        }
    }
}

/// [`RbacStore`] and [`CertificateApi`] over a Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    settings: KubeSettings,
    endpoint: String,
}

impl KubeStore {
    /// Builds a client from the configured kubeconfig context, or infers one.
    pub async fn connect(settings: KubeSettings) -> Result<Self, ConnectError> {
        let config = match &settings.context {
            Some(context) => {
                Config::from_kubeconfig(&KubeConfigOptions {
                    context: Some(context.clone()),
                    ..KubeConfigOptions::default()
                })
                .await?
            }
            None => Config::infer().await?,
        };
        let endpoint = config.cluster_url.to_string();
        let client = Client::try_from(config)?;

        info!(
            cluster = %settings.cluster_name,
            %endpoint,
            context = settings.context.as_deref().unwrap_or("<inferred>"),
            "connected to cluster"
        );
        Ok(Self::from_client(client, settings, endpoint))
    }

    /// Wraps an existing client. `endpoint` is the URL the client talks to.
    pub fn from_client(client: Client, settings: KubeSettings, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            settings,
            endpoint: endpoint.into(),
        }
    }

    fn roles(&self, ns: &str) -> Api<rbac::Role> {
        Api::namespaced(self.client.clone(), ns)
    }

    fn cluster_roles(&self) -> Api<rbac::ClusterRole> {
        Api::all(self.client.clone())
    }

    fn role_bindings(&self, ns: &str) -> Api<rbac::RoleBinding> {
        Api::namespaced(self.client.clone(), ns)
    }

    fn cluster_role_bindings(&self) -> Api<rbac::ClusterRoleBinding> {
        Api::all(self.client.clone())
    }

    fn csrs(&self) -> Api<CertificateSigningRequest> {
        Api::all(self.client.clone())
    }
}

/// Normalizes a client error into the store taxonomy.
fn store_error(object: &ObjectRef, err: kube::Error) -> StoreError {
    let object = object.clone();
    match err {
        kube::Error::Api(response) => match response.code {
            404 => StoreError::not_found(object),
            409 => StoreError::conflict(object, response.message),
            401 | 403 => StoreError::Forbidden {
                object,
                message: response.message,
            },
            429 | 500..=599 => StoreError::transient(object, response.message),
            400 | 422 => StoreError::invalid(object, response.message),
            code => StoreError::Api {
                object,
                code,
                message: response.message,
            },
        },
        kube::Error::HyperError(e) => StoreError::transient(object, e.to_string()),
        kube::Error::Service(e) => StoreError::transient(object, e.to_string()),
        other => StoreError::Api {
            object,
            code: 0,
            message: other.to_string(),
        },
    }
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == code)
}

/// Creates `desired`. On "already exists", returns the stored object so the
/// caller can compare definitions.
async fn create_object<K>(api: &Api<K>, desired: &K, object: &ObjectRef) -> StoreResult<Option<K>>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&PostParams::default(), desired).await {
        Ok(_) => Ok(None),
        Err(e) if is_status(&e, 409) => api
            .get(&object.name)
            .await
            .map(Some)
            .map_err(|e| store_error(object, e)),
        Err(e) => Err(store_error(object, e)),
    }
}

/// Settles an idempotent create by comparing the stored object with the
/// desired one.
fn settle<T>(
    existing: Option<StoreResult<T>>,
    same: impl FnOnce(&T) -> bool,
    object: &ObjectRef,
) -> StoreResult<CreateOutcome> {
    match existing {
        None => {
            debug!(%object, "created");
            Ok(CreateOutcome::Created)
        }
        Some(existing) => {
            if same(&existing?) {
                debug!(%object, "already exists with the same definition");
                Ok(CreateOutcome::AlreadyExists)
            } else {
                Err(StoreError::conflict(
                    object.clone(),
                    "exists with a different definition",
                ))
            }
        }
    }
}

async fn get_object<K>(api: &Api<K>, object: &ObjectRef) -> StoreResult<K>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug,
{
    api.get(&object.name)
        .await
        .map_err(|e| store_error(object, e))
}

async fn delete_object<K>(api: &Api<K>, object: &ObjectRef) -> StoreResult<()>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(&object.name, &DeleteParams::default()).await {
        Ok(_) => {
            debug!(%object, "deleted");
            Ok(())
        }
        Err(e) if is_status(&e, 404) => Ok(()),
        Err(e) => Err(store_error(object, e)),
    }
}

/// Lists every object of `api`, following `continue` tokens page by page.
fn list_objects<K, T>(
    api: Api<K>,
    object: ObjectRef,
    page_size: u32,
    convert: fn(K, &ObjectRef) -> StoreResult<T>,
) -> ObjectStream<T>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    T: Send + 'static,
{
    stream::try_unfold(Some(None::<String>), move |token| {
        let api = api.clone();
        let object = object.clone();
        async move {
            let Some(token) = token else {
                return Ok(None);
            };
            let mut params = ListParams::default().limit(page_size);
            if let Some(token) = &token {
                params = params.continue_token(token);
            }
            let page = api
                .list(&params)
                .await
                .map_err(|e| store_error(&object, e))?;

            let next = page
                .metadata
                .continue_
                .filter(|t| !t.is_empty())
                .map(Some);
            let items = page
                .items
                .into_iter()
                .map(|item| convert(item, &object))
                .collect::<StoreResult<Vec<T>>>()?;
            Ok::<_, StoreError>(Some((items, next)))
        }
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok::<T, StoreError>)))
    .try_flatten()
    .boxed()
}

fn namespace_name(ns: Namespace, object: &ObjectRef) -> StoreResult<String> {
    ns.metadata
        .name
        .ok_or_else(|| StoreError::invalid(object.clone(), "namespace without a name"))
}

#[async_trait]
impl RbacStore for KubeStore {
    async fn create_role(&self, role: &Role) -> StoreResult<CreateOutcome> {
        let object = ObjectRef::role(&role.key());
        let existing = match &role.scope {
            Scope::Cluster => {
                create_object(&self.cluster_roles(), &convert::cluster_role_to_kube(role), &object)
                    .await?
                    .map(|r| convert::cluster_role_from_kube(r, &object))
            }
            Scope::Namespace(ns) => {
                create_object(&self.roles(ns), &convert::role_to_kube(role), &object)
                    .await?
                    .map(|r| convert::role_from_kube(r, &object))
            }
        };
        settle(existing, |stored| stored.same_definition(role), &object)
    }

    async fn get_role(&self, key: &RoleKey) -> StoreResult<Role> {
        let object = ObjectRef::role(key);
        match &key.scope {
            Scope::Cluster => {
                let role = get_object(&self.cluster_roles(), &object).await?;
                convert::cluster_role_from_kube(role, &object)
            }
            Scope::Namespace(ns) => {
                let role = get_object(&self.roles(ns), &object).await?;
                convert::role_from_kube(role, &object)
            }
        }
    }

    fn list_roles(&self, scope: ListScope) -> ObjectStream<Role> {
        let page_size = self.settings.page_size;
        match scope {
            ListScope::Cluster => list_objects(
                self.cluster_roles(),
                ObjectRef::listing(ObjectKind::ClusterRole, None),
                page_size,
                convert::cluster_role_from_kube,
            ),
            ListScope::Namespace(ns) => list_objects(
                self.roles(&ns),
                ObjectRef::listing(ObjectKind::Role, Some(ns.as_str())),
                page_size,
                convert::role_from_kube,
            ),
            ListScope::AllNamespaces => list_objects(
                Api::all(self.client.clone()),
                ObjectRef::listing(ObjectKind::Role, None),
                page_size,
                convert::role_from_kube,
            ),
        }
    }

    async fn delete_role(&self, key: &RoleKey) -> StoreResult<()> {
        let object = ObjectRef::role(key);
        match &key.scope {
            Scope::Cluster => delete_object(&self.cluster_roles(), &object).await,
            Scope::Namespace(ns) => delete_object(&self.roles(ns), &object).await,
        }
    }

    async fn create_binding(&self, binding: &Binding) -> StoreResult<CreateOutcome> {
        let object = ObjectRef::binding(&binding.key());
        let existing = match &binding.scope {
            Scope::Cluster => create_object(
                &self.cluster_role_bindings(),
                &convert::cluster_role_binding_to_kube(binding),
                &object,
            )
            .await?
            .map(|b| convert::cluster_role_binding_from_kube(b, &object)),
            Scope::Namespace(ns) => create_object(
                &self.role_bindings(ns),
                &convert::role_binding_to_kube(binding),
                &object,
            )
            .await?
            .map(|b| convert::role_binding_from_kube(b, &object)),
        };
        settle(existing, |stored| stored.same_definition(binding), &object)
    }

    async fn get_binding(&self, key: &BindingKey) -> StoreResult<Binding> {
        let object = ObjectRef::binding(key);
        match &key.scope {
            Scope::Cluster => {
                let binding = get_object(&self.cluster_role_bindings(), &object).await?;
                convert::cluster_role_binding_from_kube(binding, &object)
            }
            Scope::Namespace(ns) => {
                let binding = get_object(&self.role_bindings(ns), &object).await?;
                convert::role_binding_from_kube(binding, &object)
            }
        }
    }

    fn list_bindings(&self, scope: ListScope) -> ObjectStream<Binding> {
        let page_size = self.settings.page_size;
        match scope {
            ListScope::Cluster => list_objects(
                self.cluster_role_bindings(),
                ObjectRef::listing(ObjectKind::ClusterRoleBinding, None),
                page_size,
                convert::cluster_role_binding_from_kube,
            ),
            ListScope::Namespace(ns) => list_objects(
                self.role_bindings(&ns),
                ObjectRef::listing(ObjectKind::RoleBinding, Some(ns.as_str())),
                page_size,
                convert::role_binding_from_kube,
            ),
            ListScope::AllNamespaces => list_objects(
                Api::all(self.client.clone()),
                ObjectRef::listing(ObjectKind::RoleBinding, None),
                page_size,
                convert::role_binding_from_kube,
            ),
        }
    }

    async fn replace_binding(&self, binding: &Binding) -> StoreResult<Binding> {
        let object = ObjectRef::binding(&binding.key());
        let pp = PostParams::default();
        match &binding.scope {
            Scope::Cluster => {
                let stored = self
                    .cluster_role_bindings()
                    .replace(
                        &binding.name,
                        &pp,
                        &convert::cluster_role_binding_to_kube(binding),
                    )
                    .await
                    .map_err(|e| store_error(&object, e))?;
                convert::cluster_role_binding_from_kube(stored, &object)
            }
            Scope::Namespace(ns) => {
                let stored = self
                    .role_bindings(ns)
                    .replace(&binding.name, &pp, &convert::role_binding_to_kube(binding))
                    .await
                    .map_err(|e| store_error(&object, e))?;
                convert::role_binding_from_kube(stored, &object)
            }
        }
    }

    async fn delete_binding(&self, key: &BindingKey) -> StoreResult<()> {
        let object = ObjectRef::binding(key);
        match &key.scope {
            Scope::Cluster => delete_object(&self.cluster_role_bindings(), &object).await,
            Scope::Namespace(ns) => delete_object(&self.role_bindings(ns), &object).await,
        }
    }

    fn list_namespaces(&self) -> ObjectStream<String> {
        list_objects(
            Api::<Namespace>::all(self.client.clone()),
            ObjectRef::listing(ObjectKind::Namespace, None),
            self.settings.page_size,
            namespace_name,
        )
    }
}

#[async_trait]
impl CertificateApi for KubeStore {
    async fn create_csr(&self, csr: &CsrObject) -> StoreResult<CreateOutcome> {
        let object = ObjectRef::csr(csr.name.clone());
        let existing = create_object(&self.csrs(), &convert::csr_to_kube(csr), &object)
            .await?
            .map(|c| convert::csr_from_kube(c, &object));
        settle(existing, |stored| stored.same_definition(csr), &object)
    }

    async fn get_csr(&self, name: &str) -> StoreResult<CsrObject> {
        let object = ObjectRef::csr(name);
        let csr = get_object(&self.csrs(), &object).await?;
        convert::csr_from_kube(csr, &object)
    }

    async fn approve_csr(&self, name: &str, reason: &str, message: &str) -> StoreResult<()> {
        let object = ObjectRef::csr(name);
        let api = self.csrs();
        let mut csr = get_object(&api, &object).await?;

        let approved = csr
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == CsrConditionKind::Approved.as_str() && c.status == "True")
            });
        if approved {
            return Ok(());
        }

        convert::push_approval(&mut csr, reason, message);
        let body = serde_json::to_vec(&csr)
            .map_err(|e| StoreError::invalid(object.clone(), e.to_string()))?;
        api.replace_subresource("approval", name, &PostParams::default(), body)
            .await
            .map_err(|e| store_error(&object, e))?;
        debug!(%object, reason, "approved");
        Ok(())
    }

    async fn delete_csr(&self, name: &str) -> StoreResult<()> {
        delete_object(&self.csrs(), &ObjectRef::csr(name)).await
    }

    async fn cluster_info(&self) -> StoreResult<ClusterInfo> {
        let endpoint = self
            .settings
            .endpoint
            .clone()
            .unwrap_or_else(|| self.endpoint.clone());

        let ca_pem = match &self.settings.ca_pem {
            Some(pem) => pem.clone(),
            None => {
                let ns = &self.settings.ca_config_map_namespace;
                let object = ObjectRef::new(ObjectKind::ConfigMap, Some(ns.as_str()), ROOT_CA_CONFIG_MAP);
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), ns);
                get_object(&api, &object)
                    .await?
                    .data
                    .and_then(|mut data| data.remove(ROOT_CA_KEY))
                    .ok_or_else(|| {
                        StoreError::invalid(object, format!("missing key {ROOT_CA_KEY}"))
                    })?
            }
        };

        Ok(ClusterInfo::new(
            self.settings.cluster_name.clone(),
            endpoint,
            ca_pem,
        ))
    }
}
