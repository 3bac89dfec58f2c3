use super::*;
use crate::association::associate;
use pretty_assertions::assert_eq;

fn names(group: &[&VirtualServer]) -> Vec<String> {
    group.iter().map(|vs| vs.name_any()).collect()
}

fn with_path(mut vs: VirtualServer, path: &str) -> VirtualServer {
    vs.spec.pools = vec![mk_pool(path, "svc", 80)];
    vs
}

#[test]
fn same_host_virtual_servers_are_grouped_by_creation() {
    let candidates = vec![
        with_path(mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "foo.com", "1.2.3.4"), "/b"),
        with_path(mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"), "/a"),
    ];
    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["a", "b"]);
}

#[test]
fn first_created_virtual_server_owns_a_path() {
    let candidates = vec![
        mk_http_vs("ns-0", "new", "2024-01-01T00:00:02Z", "foo.com", "1.2.3.4"),
        mk_http_vs("ns-0", "old", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
    ];
    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["old"]);
}

#[test]
fn creation_ties_are_broken_by_name() {
    let candidates = vec![
        mk_http_vs("ns-0", "b", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
        mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
    ];
    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["a"]);
}

#[test]
fn other_hosts_are_not_grouped() {
    let candidates = vec![
        mk_http_vs("ns-0", "foo", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
        mk_http_vs("ns-0", "bar", "2024-01-01T00:00:02Z", "bar.com", "1.2.3.4"),
    ];
    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["foo"]);
}

#[test]
fn same_host_with_different_addresses_cannot_be_grouped() {
    let candidates = vec![
        mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
        with_path(mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "foo.com", "1.2.3.5"), "/b"),
    ];
    assert!(associate(&candidates[0], &candidates, false).is_empty());
}

#[test]
fn hostless_virtual_servers_join_by_address() {
    let candidates = vec![
        mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "", "1.2.3.4"),
        with_path(mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "", "1.2.3.5"), "/b"),
        with_path(mk_http_vs("ns-0", "c", "2024-01-01T00:00:03Z", "", "1.2.3.4"), "/c"),
    ];
    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["a", "c"]);
}

#[test]
fn host_group_spans_hosts_and_namespaces() {
    let mut a = mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "b.com", "");
    a.spec.host_group = "hg".to_string();
    let mut b = mk_http_vs("ns-1", "b", "2024-01-01T00:00:02Z", "a.com", "1.2.3.4");
    b.spec.host_group = "hg".to_string();
    let mut c = mk_http_vs("ns-0", "c", "2024-01-01T00:00:03Z", "c.com", "1.2.3.4");
    c.spec.host_group = "other".to_string();
    let candidates = vec![a, b, c];

    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["b", "a"]);
}

#[test]
fn host_group_members_with_conflicting_addresses_are_excluded() {
    let mut a = mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "a.com", "1.2.3.4");
    a.spec.host_group = "hg".to_string();
    let mut b = mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "b.com", "1.2.3.5");
    b.spec.host_group = "hg".to_string();
    let candidates = vec![a, b];

    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["a"]);
}

#[test]
fn ipam_labels_must_agree() {
    let mut a = mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "");
    a.spec.ipam_label = "prod".to_string();
    let mut b = with_path(mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "foo.com", ""), "/b");
    b.spec.ipam_label = "test".to_string();
    let candidates = vec![a, b];

    assert!(associate(&candidates[0], &candidates, false).is_empty());
}

#[test]
fn labeled_hostless_virtual_server_is_never_grouped() {
    let mut vs = mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "", "");
    vs.spec.ipam_label = "prod".to_string();
    let candidates = vec![vs];

    assert!(associate(&candidates[0], &candidates, false).is_empty());
}

#[test]
fn deleted_virtual_server_is_left_out() {
    let candidates = vec![
        mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
        with_path(mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "foo.com", "1.2.3.4"), "/b"),
    ];
    let group = associate(&candidates[0], &candidates, true);
    assert_eq!(names(&group), vec!["b"]);

    // Once the older virtual server is gone, the newer one may take its path.
    let candidates = vec![
        mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
        mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "foo.com", "1.2.3.4"),
    ];
    let group = associate(&candidates[0], &candidates, true);
    assert_eq!(names(&group), vec!["b"]);
}

#[test]
fn partitions_are_not_shared() {
    let mut b = with_path(mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "foo.com", "1.2.3.4"), "/b");
    b.spec.partition = "dev".to_string();
    let candidates = vec![
        mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
        b,
    ];
    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["a"]);
}

#[test]
fn incompatible_ports_are_not_grouped() {
    let mut b = with_path(mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "foo.com", "1.2.3.4"), "/b");
    b.spec.virtual_server_http_port = 8080;
    let candidates = vec![
        mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
        b,
    ];
    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["a"]);
}

#[test]
fn host_group_converges_on_one_address() {
    let mut a = mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "a.com", "");
    a.spec.host_group = "hg".to_string();
    let mut b = mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "b.com", "1.2.3.4");
    b.spec.host_group = "hg".to_string();
    let mut c = mk_http_vs("ns-0", "c", "2024-01-01T00:00:03Z", "c.com", "1.2.3.5");
    c.spec.host_group = "hg".to_string();
    let candidates = vec![a, b, c];

    // The first address in creation order wins.
    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["a", "b"]);

    // The target's own address takes precedence.
    let group = associate(&candidates[2], &candidates, false);
    assert_eq!(names(&group), vec!["a", "c"]);
}

#[test]
fn host_group_member_joins_by_host() {
    let mut b = with_path(mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "foo.com", "1.2.3.4"), "/b");
    b.spec.host_group = "hg".to_string();
    let candidates = vec![
        mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
        b,
    ];
    let group = associate(&candidates[0], &candidates, false);
    assert_eq!(names(&group), vec!["a", "b"]);
}

#[test]
fn association_is_idempotent() {
    let mut d = mk_http_vs("ns-0", "d", "2024-01-01T00:00:01Z", "bar.com", "");
    d.spec.host_group = "hg".to_string();
    let candidates = vec![
        with_path(mk_http_vs("ns-0", "c", "2024-01-01T00:00:03Z", "foo.com", "1.2.3.4"), "/c"),
        mk_http_vs("ns-0", "a", "2024-01-01T00:00:01Z", "foo.com", "1.2.3.4"),
        mk_http_vs("ns-0", "b", "2024-01-01T00:00:02Z", "foo.com", "1.2.3.4"),
        d,
    ];

    let first = names(&associate(&candidates[0], &candidates, false));
    let second = names(&associate(&candidates[0], &candidates, false));
    assert_eq!(first, vec!["a", "c"]);
    assert_eq!(first, second);
}
