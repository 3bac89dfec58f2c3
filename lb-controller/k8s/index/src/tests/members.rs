use super::*;
use crate::{
    members::{self, EndpointMode, MemberReconciler, PoolMemberType},
    nodes::{NodeAddressType, NodeInventory},
    Namespaces,
};
use lb_controller_core::{Pool, PoolMember, Protocol, ResourceConfig, ResourceKind};
use pretty_assertions::assert_eq;
use std::str::FromStr;

const NPL: &str = r#"[
    {"podPort": 8080, "nodeIP": "10.0.0.1", "nodePort": 40000},
    {"podPort": 9090, "nodeIP": "10.0.0.1", "nodePort": 40002}
]"#;

fn mk_nodes() -> NodeInventory {
    NodeInventory::from_nodes(
        vec![
            mk_node("node-0", [("worker", "true")], "10.0.0.1", "192.168.0.1"),
            mk_node("node-1", [("worker", "false")], "10.0.0.2", "192.168.0.2"),
        ],
        NodeAddressType::External,
        &labels::Selector::default(),
    )
}

fn mk_reconciler() -> MemberReconciler {
    let mut members = MemberReconciler::new(Namespaces::All);
    members.reset_nodes(mk_nodes());
    members
}

fn mk_rs(service: &str, port: u16) -> ResourceConfig {
    let mut rs = ResourceConfig::new(
        "vs_1_2_3_4_80",
        "Common",
        "1.2.3.4",
        80,
        ResourceKind::VirtualServer,
        Protocol::Http,
    );
    rs.add_pool(Pool {
        name: format!("{service}_{port}_ns_0"),
        partition: "Common".to_string(),
        service_name: service.to_string(),
        service_namespace: "ns-0".to_string(),
        service_port: mk_port(port),
        node_member_label: String::new(),
        members: Vec::new(),
    });
    rs
}

fn mk_node_port_service() -> k8s::Service {
    mk_service(
        "ns-0",
        "svc",
        "NodePort",
        [mk_service_port("http", 80, 30000, IntOrString::Int(8080))],
        [("app", "web")],
    )
}

#[test]
fn node_inventory_filters_nodes() {
    let mut cordoned = mk_node("node-2", [("worker", "true")], "10.0.0.3", "192.168.0.3");
    cordoned.spec = Some(k8s::NodeSpec {
        unschedulable: Some(true),
        ..Default::default()
    });
    let mut addressless = mk_node("node-3", [("worker", "true")], "10.0.0.4", "192.168.0.4");
    addressless.status = None;
    let nodes = vec![
        mk_node("node-0", [("worker", "true")], "10.0.0.1", "192.168.0.1"),
        mk_node("node-1", [("worker", "false")], "10.0.0.2", "192.168.0.2"),
        cordoned,
        addressless,
    ];

    let inventory = NodeInventory::from_nodes(
        nodes.clone(),
        NodeAddressType::Internal,
        &labels::Selector::default(),
    );
    assert_eq!(
        inventory.iter().map(|n| n.address.as_str()).collect::<Vec<_>>(),
        vec!["192.168.0.1", "192.168.0.2"]
    );

    let workers = NodeInventory::from_nodes(
        nodes,
        NodeAddressType::External,
        &labels::Selector::from_str("worker=true").unwrap(),
    );
    assert_eq!(
        workers.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
        vec!["node-0"]
    );
}

#[test]
fn node_port_endpoints_follow_the_member_label() {
    let members = mk_reconciler();

    assert_eq!(
        members.endpoints_for_node_port(30000, ""),
        vec![
            PoolMember::enabled("10.0.0.1", 30000),
            PoolMember::enabled("10.0.0.2", 30000),
        ]
    );
    assert_eq!(
        members.endpoints_for_node_port(30000, "worker=true"),
        vec![PoolMember::enabled("10.0.0.1", 30000)]
    );
    assert!(members.endpoints_for_node_port(30000, "invalid label").is_empty());
}

#[test]
fn reset_nodes_reports_changes() {
    let mut members = mk_reconciler();
    assert!(!members.reset_nodes(mk_nodes()));
    assert!(members.reset_nodes(NodeInventory::default()));
    assert!(members.nodes().is_empty());
}

#[test]
fn node_port_local_endpoints() {
    let members = mk_reconciler();
    let pods = vec![
        mk_pod("ns-0", "pod-0", [("app", "web")], [("http", 8080)], Some(NPL)),
        mk_pod(
            "ns-0",
            "pod-1",
            [("app", "web")],
            [("http", 8080)],
            Some(r#"[{"podPort": 8080, "nodeIP": "10.0.0.2", "nodePort": 40001}]"#),
        ),
    ];

    let expected = vec![
        PoolMember::enabled("10.0.0.1", 40000),
        PoolMember::enabled("10.0.0.2", 40001),
    ];
    assert_eq!(members.endpoints_for_npl(&IntOrString::Int(8080), &pods), expected);
    assert_eq!(
        members.endpoints_for_npl(&IntOrString::String("http".to_string()), &pods),
        expected
    );
    assert_eq!(
        members.endpoints_for_npl(&IntOrString::Int(9090), &pods),
        vec![PoolMember::enabled("10.0.0.1", 40002)]
    );
    assert!(members.endpoints_for_npl(&IntOrString::String("metrics".to_string()), &pods).is_empty());
}

#[test]
fn malformed_node_port_local_annotations() {
    let mut members = mk_reconciler();

    let pod = mk_pod(
        "ns-0",
        "pod-0",
        [("app", "web")],
        [("http", 8080)],
        Some(r#"[{"podPort": "x"}, {"podPort": 8080, "nodeIP": "10.0.0.1", "nodePort": 40000}]"#),
    );
    assert!(members.apply_pod(&pod));
    assert_eq!(members.npl_records("ns-0", "pod-0").map(|r| r.len()), Some(1));
    assert!(!members.apply_pod(&pod));

    let pod = mk_pod("ns-0", "pod-0", [("app", "web")], [("http", 8080)], Some("{not json"));
    assert!(members.apply_pod(&pod));
    assert_eq!(members.npl_records("ns-0", "pod-0"), None);
    assert!(members.endpoints_for_npl(&IntOrString::Int(8080), &[pod]).is_empty());
}

#[test]
fn node_port_lookup() {
    let svc = mk_node_port_service();
    assert_eq!(members::node_port(&svc, &mk_port(80)), Some(30000));
    assert_eq!(members::node_port(&svc, &Port::Name("http".to_string())), Some(30000));
    assert_eq!(members::node_port(&svc, &mk_port(81)), None);
}

#[test]
fn endpoint_mode_requires_annotation() {
    let mut svc = mk_node_port_service();
    assert_eq!(
        members::endpoint_mode(&svc, PoolMemberType::NodePortLocal),
        EndpointMode::NodePort
    );

    svc.metadata.annotations = Some(
        Some((members::NPL_SERVICE_ANNOTATION.to_string(), "true".to_string()))
            .into_iter()
            .collect(),
    );
    assert_eq!(
        members::endpoint_mode(&svc, PoolMemberType::NodePortLocal),
        EndpointMode::NodePortLocal
    );
    assert_eq!(
        members::endpoint_mode(&svc, PoolMemberType::NodePort),
        EndpointMode::NodePort
    );
}

#[test]
fn update_pool_members_for_node_port() {
    let _tracing = init_tracing();
    let mut members = mk_reconciler();
    let mut rs = mk_rs("svc", 80);

    // Pools of services that are not cached keep their members.
    rs.pools[0].members = vec![PoolMember::enabled("10.0.0.9", 30000)];
    members.update_pool_members_for_node_port(&mut rs, "ns-0");
    assert_eq!(rs.pools[0].members, vec![PoolMember::enabled("10.0.0.9", 30000)]);

    members.apply_service(&mk_node_port_service(), EndpointMode::NodePort);
    members.update_pool_members_for_node_port(&mut rs, "ns-0");
    assert_eq!(
        rs.pools[0].members,
        vec![
            PoolMember::enabled("10.0.0.1", 30000),
            PoolMember::enabled("10.0.0.2", 30000),
        ]
    );
    let info = members.pool_members_info("ns-0", "svc").unwrap();
    assert_eq!(info.members.values().map(Vec::len).sum::<usize>(), 2);

    members.reset_nodes(NodeInventory::from_nodes(
        vec![mk_node("node-0", [("worker", "true")], "10.0.0.1", "192.168.0.1")],
        NodeAddressType::External,
        &labels::Selector::default(),
    ));
    members.update_pool_members_for_node_port(&mut rs, "ns-0");
    assert_eq!(rs.pools[0].members, vec![PoolMember::enabled("10.0.0.1", 30000)]);

    // Pools referencing a port the service does not expose have no members.
    let mut other = mk_rs("svc", 81);
    members.update_pool_members_for_node_port(&mut other, "ns-0");
    assert!(other.pools[0].members.is_empty());
}

#[test]
fn update_pool_members_ignores_unwatched_namespaces() {
    let mut members = MemberReconciler::new(Namespaces::from_iter(["ns-1".to_string()]));
    members.reset_nodes(mk_nodes());
    members.apply_service(&mk_node_port_service(), EndpointMode::NodePort);

    let mut rs = mk_rs("svc", 80);
    rs.pools[0].members = vec![PoolMember::enabled("10.0.0.9", 30000)];
    members.update_pool_members_for_node_port(&mut rs, "ns-0");
    assert_eq!(rs.pools[0].members, vec![PoolMember::enabled("10.0.0.9", 30000)]);
}

#[test]
fn update_pool_members_for_npl() {
    let _tracing = init_tracing();
    let store = FakeStore::default();
    store.apply_pod(mk_pod("ns-0", "pod-0", [("app", "web")], [("http", 8080)], Some(NPL)));
    store.apply_pod(mk_pod("ns-0", "pod-1", [("app", "db")], [("http", 8080)], Some(NPL)));

    let mut members = mk_reconciler();
    members.apply_service(&mk_node_port_service(), EndpointMode::NodePortLocal);

    let mut rs = mk_rs("svc", 80);
    members.update_pool_members_for_node_port(&mut rs, "ns-0");
    assert!(rs.pools[0].members.is_empty());

    members.update_pool_members_for_npl(&mut rs, "ns-0", &store);
    assert_eq!(rs.pools[0].members, vec![PoolMember::enabled("10.0.0.1", 40000)]);
}

#[test]
fn node_port_members_are_limited_to_labeled_nodes() {
    let mut members = MemberReconciler::new(Namespaces::All);
    members.reset_nodes(NodeInventory::from_nodes(
        vec![
            mk_node("node-0", [("worker", "true")], "10.0.0.1", "192.168.0.1"),
            mk_node("node-1", [("worker", "true")], "10.0.0.2", "192.168.0.2"),
            mk_node("node-2", [("worker", "false")], "10.0.0.3", "192.168.0.3"),
        ],
        NodeAddressType::External,
        &labels::Selector::default(),
    ));
    members.apply_service(&mk_node_port_service(), EndpointMode::NodePort);

    let mut rs = mk_rs("svc", 80);
    rs.pools[0].node_member_label = "worker=true".to_string();
    members.update_pool_members_for_node_port(&mut rs, "ns-0");
    assert_eq!(
        rs.pools[0].members,
        vec![
            PoolMember::enabled("10.0.0.1", 30000),
            PoolMember::enabled("10.0.0.2", 30000),
        ]
    );
}
