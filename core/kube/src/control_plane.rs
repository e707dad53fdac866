//! Cluster control plane backed by the Kubernetes API server.
use std::collections::BTreeMap;

use anyhow::Result;
use k8s_openapi::api::authorization::v1::ResourceAttributes;
use k8s_openapi::api::authorization::v1::SelfSubjectAccessReview;
use k8s_openapi::api::authorization::v1::SelfSubjectAccessReviewSpec;
use k8s_openapi::api::core::v1::LimitRange as KubeLimitRange;
use k8s_openapi::api::core::v1::LimitRangeItem;
use k8s_openapi::api::core::v1::LimitRangeSpec;
use k8s_openapi::api::core::v1::Namespace as KubeNamespace;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::api::rbac::v1::RoleRef;
use k8s_openapi::api::rbac::v1::Subject;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::Api;
use kube::api::DeleteParams;
use kube::api::ListParams;
use kube::api::ObjectMeta;
use kube::api::PostParams;
use kube::api::Preconditions;

use kportal_context::Context;
use kportal_controlplane::AccessReview;
use kportal_controlplane::Binding;
use kportal_controlplane::ControlPlaneBackend;
use kportal_controlplane::LimitRange;
use kportal_controlplane::Namespace;
use kportal_controlplane::OtherSubject;
use kportal_controlplane::Scope;

use super::errors::classify;
use super::FIELD_MANAGER;
use super::MANAGED_BY_LABEL;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// Control plane operating on a Kubernetes cluster.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: kube::Client,
    config: kube::Config,
}

impl KubeControlPlane {
    pub fn new(config: kube::Config) -> Result<KubeControlPlane> {
        let client = kube::Client::try_from(config.clone())?;
        Ok(KubeControlPlane { client, config })
    }

    /// Client acting as the given identity, for access reviews.
    fn impersonate(&self, identity: &str) -> Result<kube::Client> {
        let mut config = self.config.clone();
        config.auth_info.impersonate = Some(identity.to_string());
        let client = kube::Client::try_from(config)?;
        Ok(client)
    }
}

#[async_trait::async_trait]
impl ControlPlaneBackend for KubeControlPlane {
    async fn access_review(&self, _: &Context, review: &AccessReview) -> Result<bool> {
        let client = self.impersonate(&review.identity)?;
        let request = SelfSubjectAccessReview {
            metadata: ObjectMeta::default(),
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    group: Some(review.group.clone()),
                    namespace: review.namespace.clone(),
                    resource: Some(review.resource.clone()),
                    verb: Some(review.verb.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            status: None,
        };
        let api: Api<SelfSubjectAccessReview> = Api::all(client);
        let response = api
            .create(&PostParams::default(), &request)
            .await
            .map_err(|error| {
                classify(error, "access review", &review.identity, "access review")
            })?;
        let allowed = response
            .status
            .map(|status| status.allowed)
            .unwrap_or(false);
        Ok(allowed)
    }

    async fn create_binding(&self, _: &Context, binding: Binding) -> Result<Binding> {
        let name = binding.name.clone();
        let scope = binding.scope.clone();
        let binding = match &scope {
            Scope::Cluster => {
                let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
                let object = to_cluster_binding(binding);
                let object = api
                    .create(&PostParams::default(), &object)
                    .await
                    .map_err(|error| classify(error, "binding", &name, "create binding"))?;
                from_cluster_binding(object)
            }
            Scope::Namespace(namespace) => {
                let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
                let object = to_role_binding(binding);
                let object = api
                    .create(&PostParams::default(), &object)
                    .await
                    .map_err(|error| classify(error, "binding", &name, "create binding"))?;
                from_role_binding(object, scope.clone())
            }
        };
        Ok(binding)
    }

    async fn create_limits(&self, _: &Context, limits: LimitRange) -> Result<()> {
        let api: Api<KubeLimitRange> = Api::namespaced(self.client.clone(), &limits.namespace);
        let quantity =
            |value: &str| BTreeMap::from([("memory".to_string(), Quantity(value.to_string()))]);
        let object = KubeLimitRange {
            metadata: metadata(&limits.name, None),
            spec: Some(LimitRangeSpec {
                limits: vec![LimitRangeItem {
                    default: Some(quantity(&limits.memory_limit)),
                    default_request: Some(quantity(&limits.memory_request)),
                    type_: "Container".to_string(),
                    ..Default::default()
                }],
            }),
        };
        api.create(&PostParams::default(), &object)
            .await
            .map_err(|error| classify(error, "limits", &limits.name, "create limits"))?;
        Ok(())
    }

    async fn create_namespace(&self, _: &Context, name: &str) -> Result<Namespace> {
        let api: Api<KubeNamespace> = Api::all(self.client.clone());
        let object = KubeNamespace {
            metadata: metadata(name, None),
            ..Default::default()
        };
        let object = api
            .create(&PostParams::default(), &object)
            .await
            .map_err(|error| classify(error, "namespace", name, "create namespace"))?;
        Ok(from_namespace(object))
    }

    async fn delete_binding(&self, _: &Context, binding: &Binding) -> Result<()> {
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                resource_version: binding.version.clone(),
                uid: None,
            }),
            ..Default::default()
        };
        let result = match &binding.scope {
            Scope::Cluster => {
                let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
                api.delete(&binding.name, &params).await.map(|_| ())
            }
            Scope::Namespace(namespace) => {
                let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
                api.delete(&binding.name, &params).await.map(|_| ())
            }
        };
        result.map_err(|error| classify(error, "binding", &binding.name, "delete binding"))
    }

    async fn delete_namespace(&self, _: &Context, name: &str) -> Result<()> {
        let api: Api<KubeNamespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|error| classify(error, "namespace", name, "delete namespace"))?;
        Ok(())
    }

    async fn get_binding(
        &self,
        _: &Context,
        scope: &Scope,
        name: &str,
    ) -> Result<Option<Binding>> {
        let binding = match scope {
            Scope::Cluster => {
                let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
                api.get_opt(name)
                    .await
                    .map_err(|error| classify(error, "binding", name, "get binding"))?
                    .map(from_cluster_binding)
            }
            Scope::Namespace(namespace) => {
                let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
                api.get_opt(name)
                    .await
                    .map_err(|error| classify(error, "binding", name, "get binding"))?
                    .map(|object| from_role_binding(object, scope.clone()))
            }
        };
        Ok(binding)
    }

    async fn get_namespace(&self, _: &Context, name: &str) -> Result<Option<Namespace>> {
        let api: Api<KubeNamespace> = Api::all(self.client.clone());
        let namespace = api
            .get_opt(name)
            .await
            .map_err(|error| classify(error, "namespace", name, "get namespace"))?;
        Ok(namespace.map(from_namespace))
    }

    async fn list_bindings(&self, _: &Context, scope: &Scope) -> Result<Vec<Binding>> {
        let params = ListParams::default();
        let bindings = match scope {
            Scope::Cluster => {
                let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
                api.list(&params)
                    .await
                    .map_err(|error| classify(error, "binding", "*", "list bindings"))?
                    .into_iter()
                    .map(from_cluster_binding)
                    .collect()
            }
            Scope::Namespace(namespace) => {
                let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
                api.list(&params)
                    .await
                    .map_err(|error| classify(error, "binding", "*", "list bindings"))?
                    .into_iter()
                    .map(|object| from_role_binding(object, scope.clone()))
                    .collect()
            }
        };
        Ok(bindings)
    }

    async fn list_namespaces(&self, _: &Context) -> Result<Vec<Namespace>> {
        let api: Api<KubeNamespace> = Api::all(self.client.clone());
        let namespaces = api
            .list(&ListParams::default())
            .await
            .map_err(|error| classify(error, "namespace", "*", "list namespaces"))?;
        Ok(namespaces.into_iter().map(from_namespace).collect())
    }

    fn supports_access_review(&self) -> bool {
        true
    }

    async fn update_binding(&self, _: &Context, binding: Binding) -> Result<Binding> {
        let name = binding.name.clone();
        let scope = binding.scope.clone();
        let binding = match &scope {
            Scope::Cluster => {
                let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
                let object = to_cluster_binding(binding);
                let object = api
                    .replace(&name, &PostParams::default(), &object)
                    .await
                    .map_err(|error| classify(error, "binding", &name, "update binding"))?;
                from_cluster_binding(object)
            }
            Scope::Namespace(namespace) => {
                let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
                let object = to_role_binding(binding);
                let object = api
                    .replace(&name, &PostParams::default(), &object)
                    .await
                    .map_err(|error| classify(error, "binding", &name, "update binding"))?;
                from_role_binding(object, scope.clone())
            }
        };
        Ok(binding)
    }
}

fn metadata(name: &str, version: Option<String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            FIELD_MANAGER.to_string(),
        )])),
        resource_version: version,
        ..Default::default()
    }
}

fn role_ref(binding: &Binding) -> RoleRef {
    RoleRef {
        api_group: RBAC_GROUP.to_string(),
        kind: "ClusterRole".to_string(),
        name: binding.role_ref.clone(),
    }
}

fn subjects(binding: &Binding) -> Option<Vec<Subject>> {
    let identities = binding.subjects.iter().map(|identity| Subject {
        api_group: Some(RBAC_GROUP.to_string()),
        kind: "User".to_string(),
        name: identity.clone(),
        namespace: None,
    });
    let others = binding.other_subjects.iter().map(|other| Subject {
        api_group: other.api_group.clone(),
        kind: other.kind.clone(),
        name: other.name.clone(),
        namespace: other.namespace.clone(),
    });
    Some(identities.chain(others).collect())
}

/// Split binding subjects into identities and subjects the portal does not manage.
fn split_subjects(subjects: Option<Vec<Subject>>) -> (Vec<String>, Vec<OtherSubject>) {
    let mut identities = Vec::new();
    let mut others = Vec::new();
    for subject in subjects.unwrap_or_default() {
        if subject.kind == "User" {
            identities.push(subject.name);
            continue;
        }
        others.push(OtherSubject {
            api_group: subject.api_group,
            kind: subject.kind,
            name: subject.name,
            namespace: subject.namespace,
        });
    }
    (identities, others)
}

fn to_cluster_binding(binding: Binding) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: metadata(&binding.name, binding.version.clone()),
        role_ref: role_ref(&binding),
        subjects: subjects(&binding),
    }
}

fn to_role_binding(binding: Binding) -> RoleBinding {
    let mut metadata = metadata(&binding.name, binding.version.clone());
    metadata.namespace = binding.scope.namespace_name().map(String::from);
    RoleBinding {
        metadata,
        role_ref: role_ref(&binding),
        subjects: subjects(&binding),
    }
}

fn from_cluster_binding(object: ClusterRoleBinding) -> Binding {
    let (subjects, other_subjects) = split_subjects(object.subjects);
    Binding {
        name: object.metadata.name.unwrap_or_default(),
        role_ref: object.role_ref.name,
        scope: Scope::Cluster,
        subjects,
        other_subjects,
        version: object.metadata.resource_version,
    }
}

fn from_role_binding(object: RoleBinding, scope: Scope) -> Binding {
    let (subjects, other_subjects) = split_subjects(object.subjects);
    Binding {
        name: object.metadata.name.unwrap_or_default(),
        role_ref: object.role_ref.name,
        scope,
        subjects,
        other_subjects,
        version: object.metadata.resource_version,
    }
}

fn from_namespace(object: KubeNamespace) -> Namespace {
    let terminating = object
        .status
        .and_then(|status| status.phase)
        .map(|phase| phase == "Terminating")
        .unwrap_or(false);
    Namespace {
        name: object.metadata.name.unwrap_or_default(),
        terminating,
    }
}
