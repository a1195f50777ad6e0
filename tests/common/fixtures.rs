//! Feed bundle fixtures and mock feed servers

use flate2::Compression;
use flate2::write::GzEncoder;
use nrd_blocklists::decoder::encode;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Decoded records resembling real feed lines
pub const SAMPLE_RECORDS: &[&str] = &[
    "alert dns any any -> any any (msg:\"NRD\"; content:\"fresh-shop.example\";)",
    "alert dns any any -> any any (msg:\"NRD\"; content:\"login.secure-bank.example\";)",
    "alert dns any any -> any any (msg:\"NRD\"; content:\"bücher.example\";)",
    "contact admin@mail.example for removal",
    "benign.example",
];

/// Domains [`SAMPLE_RECORDS`] decode to, sorted
pub const SAMPLE_DOMAINS: &[&str] = &[
    "benign.example",
    "fresh-shop.example",
    "login.secure-bank.example",
    "xn--bcher-kva.example",
];

/// Feed file body: one base64 line per record
pub fn feed_body(records: &[&str]) -> String {
    records.iter().map(|r| format!("{}\n", encode(r))).collect()
}

/// Gzipped tar with `members` (path, contents)
pub fn tar_gz(members: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (member, contents) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, member, contents.as_bytes())
            .expect("append member");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Bundle laid out like the vendor's: nested directory, rules file, notice
pub fn feed_bundle(entry: &str, records: &[&str]) -> Vec<u8> {
    let body = feed_body(records);
    let data = format!("{entry}/{entry}");
    let rules = format!("{entry}/{entry}.rules");
    let notice = format!("{entry}/COPYRIGHT");
    tar_gz(&[
        (data.as_str(), body.as_str()),
        (rules.as_str(), "alert dns any any"),
        (notice.as_str(), "(c) vendor"),
    ])
}

/// Serve `bundle` at `/{name}.tar.gz`, with `etag` on both HEAD and GET
pub async fn mount_feed(server: &MockServer, name: &str, etag: Option<&str>, bundle: Vec<u8>) {
    let route = format!("/{name}.tar.gz");

    let mut head = ResponseTemplate::new(200);
    let mut get = ResponseTemplate::new(200).set_body_bytes(bundle);
    if let Some(etag) = etag {
        head = head.insert_header("ETag", etag);
        get = get.insert_header("ETag", etag);
    }

    Mock::given(method("HEAD"))
        .and(path(route.clone()))
        .respond_with(head)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(get)
        .mount(server)
        .await;
}

/// Number of GET requests the server has received
pub async fn get_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .count()
}
