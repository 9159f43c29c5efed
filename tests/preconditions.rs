//! ETag handling and conditional requests

mod common;

use common::{alice, Harness};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use xcapcore::XcapRequest;

const APP: &str = "test-app";
const DOC: &str = "<root xmlns=\"test-app\"><item n=\"0\"/></root>";

#[test]
fn test_if_match() {
    let harness = Harness::new();
    let etag = harness.put_document(APP, DOC).etag.unwrap();

    let stale = XcapRequest::put(harness.document_uri(APP), alice(), DOC).with_if_match("\"not-the-tag\"");
    assert_eq!(harness.server.handle(&stale).status, 412);
    let current = harness.get_document(APP);
    assert_eq!(current.etag.as_ref(), Some(&etag));
    assert_eq!(current.body_text(), DOC);

    let fresh = XcapRequest::put(harness.document_uri(APP), alice(), DOC).with_if_match(&etag.header_value());
    let response = harness.server.handle(&fresh);
    assert_eq!(response.status, 200);
    assert_ne!(response.etag, Some(etag));
}

#[test]
fn test_if_none_match_star_only_creates() {
    let harness = Harness::new();
    let create = XcapRequest::put(harness.document_uri(APP), alice(), DOC).with_if_none_match("*");
    assert_eq!(harness.server.handle(&create).status, 201);
    assert_eq!(harness.server.handle(&create).status, 412);
}

#[test]
fn test_conditional_get() {
    let harness = Harness::new();
    let etag = harness.put_document(APP, DOC).etag.unwrap();
    let request = XcapRequest::get(harness.document_uri(APP), alice()).with_if_none_match(&etag.header_value());
    assert_eq!(harness.server.handle(&request).status, 304);
    let request = XcapRequest::get(harness.document_uri(APP), alice()).with_if_match("\"other\"");
    assert_eq!(harness.server.handle(&request).status, 412);
}

#[test]
fn test_delete_with_stale_tag_keeps_document() {
    let harness = Harness::new();
    let etag = harness.put_document(APP, DOC).etag;
    let request = XcapRequest::delete(harness.node_uri(APP, "/root/item"), alice()).with_if_match("\"stale\"");
    assert_eq!(harness.server.handle(&request).status, 412);
    let current = harness.get_document(APP);
    assert_eq!(current.body_text(), DOC);
    assert_eq!(current.etag, etag);
}

#[test]
fn test_every_write_gets_a_new_tag() {
    let harness = Harness::new();
    let mut seen = HashSet::new();
    for _ in 0..20 {
        let etag = harness.put_document(APP, DOC).etag.unwrap();
        assert_eq!(etag.as_str().len(), 32);
        assert!(seen.insert(etag));
    }
}

#[test]
fn test_concurrent_if_match_writers() {
    let harness = Harness::new();
    let etag = harness.put_document(APP, DOC).etag.unwrap();
    harness.notifier.take();

    let statuses: Vec<u16> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let harness = &harness;
                let etag = etag.clone();
                s.spawn(move || {
                    let selector = format!("/root/item[@n=\"{}\"]", i + 1);
                    let request = XcapRequest::put(
                        harness.node_uri(APP, &selector),
                        alice(),
                        format!("<item n=\"{}\"/>", i + 1),
                    )
                    .with_if_match(&etag.header_value());
                    harness.server.handle(&request).status
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Only the first writer sees the tag it was given
    assert_eq!(statuses.iter().filter(|&&s| s == 201).count(), 1);
    assert_eq!(statuses.iter().filter(|&&s| s == 412).count(), 7);
    assert_eq!(harness.notifier.take().len(), 1);
}

#[test]
fn test_failed_mutation_is_not_persisted() {
    let harness = Harness::new();
    let etag = harness.put_document(APP, DOC).etag;
    let response = harness.put_element(APP, "/root/item[5]", "<item/>");
    assert_eq!(response.status, 409);
    assert_eq!(harness.get_document(APP).etag, etag);
    assert_eq!(harness.delete(APP, "/root/missing").status, 404);
}
