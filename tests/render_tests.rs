use netdiag_rs::checks::{Check, CheckReply};
use netdiag_rs::render::{
    render_check, render_progress, render_records, render_results, DisplayFragment, Span,
    NO_INFORMATION,
};
use netdiag_rs::types::RecordResult;

fn sample() -> Vec<RecordResult> {
    vec![
        RecordResult::new("DMARC", vec!["v=DMARC1; p=reject".into()]),
        RecordResult::new("SPF", vec![]).with_status("No SPF record found."),
        RecordResult::new("DKIM", vec!["v=DKIM1; k=rsa;\np=MIGf...".into()])
            .with_query("google._domainkey.example.com"),
    ]
}

#[test]
fn rendering_is_pure() {
    let a = render_results(&sample(), &["google".into(), "default".into()]);
    let b = render_results(&sample(), &["google".into(), "default".into()]);
    assert_eq!(a, b);
    assert_eq!(a.to_html(), b.to_html());
}

#[test]
fn cards_keep_input_order_and_duplicates() {
    let mut results = sample();
    results.push(RecordResult::new("DMARC", vec!["v=DMARC1; p=reject".into()]));
    let DisplayFragment::Results { cards, footer } = render_results(&results, &[]) else {
        panic!("expected results");
    };
    let headers: Vec<&str> = cards.iter().map(|c| c.header.as_str()).collect();
    assert_eq!(
        headers,
        vec![
            "DMARC record",
            "SPF record",
            "DKIM record (google._domainkey.example.com)",
            "DMARC record"
        ]
    );
    assert_eq!(footer, None);
}

#[test]
fn query_label_only_shown_for_dkim() {
    let results = vec![RecordResult::new("SPF", vec!["v=spf1 -all".into()]).with_query("example.com")];
    let DisplayFragment::Results { cards, .. } = render_results(&results, &[]) else {
        panic!("expected results");
    };
    assert_eq!(cards[0].header, "SPF record");
}

#[test]
fn empty_records_use_status_or_default() {
    let results = vec![
        RecordResult::new("SPF", vec![]).with_status("No SPF record found."),
        RecordResult::new("DMARC", vec![]),
    ];
    let DisplayFragment::Results { cards, .. } = render_results(&results, &[]) else {
        panic!("expected results");
    };
    assert!(cards.iter().all(|c| c.body.len() == 1 && c.body[0].status));
    assert_eq!(cards[0].body[0].lines[0].text(), "No SPF record found.");
    assert_eq!(cards[1].body[0].lines[0].text(), NO_INFORMATION);
}

#[test]
fn embedded_newlines_are_line_breaks_not_entries() {
    let DisplayFragment::Results { cards, .. } = render_results(&sample(), &[]) else {
        panic!("expected results");
    };
    let dkim = &cards[2];
    assert_eq!(dkim.body.len(), 1);
    let lines: Vec<String> = dkim.body[0].lines.iter().map(|l| l.text()).collect();
    assert_eq!(lines, vec!["v=DKIM1; k=rsa;", "p=MIGf..."]);
    assert!(render_results(&sample(), &[])
        .to_html()
        .contains("v=DKIM1; k=rsa;<br>p=MIGf..."));
}

#[test]
fn footer_joins_selectors_in_engine_order() {
    let frag = render_results(&[], &["s2".into(), "s1".into(), "default".into()]);
    let DisplayFragment::Results { footer, .. } = &frag else {
        panic!("expected results");
    };
    assert_eq!(footer.as_deref(), Some("s2, s1, default"));
    assert!(frag.to_string().ends_with("Checked selectors: s2, s1, default"));
}

#[test]
fn html_escapes_record_text() {
    let results = vec![RecordResult::new("TXT", vec![r#"<b>"quoted" & more</b>"#.into()])];
    let html = render_results(&results, &[]).to_html();
    assert!(html.contains("&lt;b&gt;"));
    assert!(html.contains("&amp; more"));
    assert!(!html.contains("<b>"));
}

#[test]
fn progress_fragment_text() {
    assert_eq!(
        render_progress(0, 0, 0).to_string(),
        "[....................]   0% checking... (0 / 0)"
    );
    assert_eq!(
        render_progress(100, 3, 3).to_string(),
        "[####################] 100% checking... (3 / 3)"
    );
}

#[test]
fn dns_records_mark_ip_addresses() {
    let results = vec![RecordResult::new(
        "MX",
        vec!["10 mail.example.com\n    -> A: [IP]192.0.2.25".into()],
    )];
    let DisplayFragment::Results { cards, .. } = render_records(&results) else {
        panic!("expected results");
    };
    let second = &cards[0].body[0].lines[1];
    assert_eq!(second.0.last(), Some(&Span::Ip("192.0.2.25".into())));
    assert!(render_records(&results)
        .to_html()
        .contains(r#"data-ip="192.0.2.25""#));
}

#[test]
fn check_rendering_dispatch() {
    let whois = Check::Whois {
        query: "example.com".into(),
    };
    let frag = render_check(&whois, &CheckReply::Text("Registry Expiry Date: 2030-08-13".into()));
    let DisplayFragment::Text { lines } = &frag else {
        panic!("expected text");
    };
    assert!(matches!(lines[0].0[0], Span::Date(_)));
    assert!(frag.to_html().contains("highlight-green"));

    let ping = Check::Ping {
        host: "example.com".into(),
    };
    let frag = render_check(&ping, &CheckReply::Failure("host unreachable".into()));
    assert_eq!(
        frag,
        DisplayFragment::Error {
            message: "host unreachable".into(),
            detail: None
        }
    );
}
