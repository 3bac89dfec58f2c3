#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cis;
pub mod ipam;
pub mod labels;

pub use self::labels::Labels;
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{
            Container, ContainerPort, Node, NodeAddress, NodeSpec, NodeStatus, Pod, PodSpec,
            Service, ServicePort, ServiceSpec,
        },
    },
    apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString},
};
pub use kube::{Resource, ResourceExt};
