// trustlayer-core/tests/exchange_tests.rs
//! End-to-end behaviour of the redaction/restoration cycle.

use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use test_log::test; // routes `log` output of the code under test through env_logger

use trustlayer_core::{
    restore, ExchangeId, ExchangePipeline, FlowStore, Mapping, MemoryAuditSink, RegexDetector, StreamConfig,
    StreamStrategy, Tokenizer, TrustLayerConfig, TrustLayerError,
};

const SCENARIO: &str = "My name is John Doe and my email is john.doe@example.com. Call me at 555-0199.";

fn tokenizer() -> Tokenizer {
    Tokenizer::new(Arc::new(RegexDetector::with_default_rules().unwrap()))
}

fn pipeline(strategy: StreamStrategy) -> (ExchangePipeline, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let config = TrustLayerConfig {
        stream: StreamConfig {
            strategy,
            ..Default::default()
        },
        ..Default::default()
    };
    let pipeline = ExchangePipeline::new(
        Arc::new(RegexDetector::with_default_rules().unwrap()),
        Arc::new(FlowStore::default()),
        audit.clone(),
        config,
    );
    (pipeline, audit)
}

fn samples() -> Vec<&'static str> {
    vec![
        SCENARIO,
        "Mr. Smith paid with 4111 1111 1111 1111 from 10.0.0.12, ssn 123-45-6789.",
        "Email a@x.io, b@y.io and a@x.io again. This is Maria Lopez.",
        "Nothing sensitive in here at all.",
        "",
        "héllo wörld, I am Zoë? no: I am Anna Berg, anna@bergmail.se",
    ]
}

#[test]
fn test_round_trip_restores_original() {
    let tokenizer = tokenizer();
    for text in samples() {
        let result = tokenizer.redact(text).unwrap();
        assert_eq!(restore(&result.redacted_text, &result.mapping), text, "round trip of {:?}", text);
    }
}

#[test]
fn test_restore_is_idempotent() {
    let tokenizer = tokenizer();
    for text in samples() {
        let result = tokenizer.redact(text).unwrap();
        let once = restore(&result.redacted_text, &result.mapping);
        assert_eq!(restore(&once, &result.mapping), once);
    }
}

#[test]
fn test_counts_match_mapping_and_tokens_are_unique() {
    let tokenizer = tokenizer();
    for text in samples() {
        let result = tokenizer.redact(text).unwrap();
        assert_eq!(result.entity_counts.values().sum::<usize>(), result.mapping.len());
        let mut tokens: Vec<&str> = result.mapping.tokens().collect();
        tokens.sort_unstable();
        tokens.dedup();
        assert_eq!(tokens.len(), result.mapping.len());
        for token in result.mapping.tokens() {
            assert_eq!(result.redacted_text.matches(token).count(), 1, "{} in {:?}", token, text);
        }
    }
}

#[test]
fn test_uuid_is_never_analysed() {
    let uuid = "550e8400-e29b-41d4-a716-446655440000";
    let result = tokenizer().redact(uuid).unwrap();
    assert_eq!(result.redacted_text, uuid);
    assert!(result.mapping.is_empty());
    assert!(result.entity_counts.is_empty());
}

#[test]
fn test_scenario_sentence() {
    let result = tokenizer().redact(SCENARIO).unwrap();
    for entity_type in ["PERSON", "EMAIL_ADDRESS", "PHONE_NUMBER"] {
        assert_eq!(result.entity_counts.get(entity_type), Some(&1), "{}", entity_type);
        assert!(result.redacted_text.contains(&format!("[{}_1]", entity_type)));
    }
    for raw in ["John Doe", "john.doe@example.com", "555-0199"] {
        assert!(!result.redacted_text.contains(raw), "{} leaked", raw);
    }
    let echo = format!("You wrote: {}", result.redacted_text);
    assert_eq!(restore(&echo, &result.mapping), format!("You wrote: {}", SCENARIO));
}

#[test]
fn test_clean_json_passes_unchanged() {
    let (pipeline, audit) = pipeline(StreamStrategy::Buffered);
    let body = br#"{"messages":[{"content":"Hi there"}]}"#;
    let id = ExchangeId::from("hi");
    let outcome = pipeline.process_request(&id, body).unwrap();
    assert_eq!(outcome.body, body.to_vec());
    assert!(!pipeline.store().contains(&id));
    assert!(audit.records().is_empty());
}

#[test]
fn test_chunk_boundary_split_matches_buffered() {
    let mut mapping = Mapping::new();
    mapping.insert("[PERSON_1]", "Sachin");
    let chunks: [&[u8]; 2] = [b"...is [PER", b"SON_1] today"];

    let store = FlowStore::default();
    let id = ExchangeId::from("split");
    store.put(id.clone(), mapping.clone());
    let config = StreamConfig {
        strategy: StreamStrategy::Incremental,
        ..Default::default()
    };
    let mut rewriter = trustlayer_core::ResponseRewriter::begin(&store, id, None, &config);

    let mut streamed = Vec::new();
    for chunk in chunks {
        streamed.extend(rewriter.feed(chunk).unwrap());
    }
    streamed.extend(rewriter.finish().unwrap());

    assert_eq!(streamed, restore("...is [PERSON_1] today", &mapping).into_bytes());
    assert!(store.is_empty());
}

#[test]
fn test_every_split_point_of_a_real_exchange() {
    let request = json!({"messages": [{"role": "user", "content": SCENARIO}]});
    let reply = "Noted, [PERSON_1]. I will write to [EMAIL_ADDRESS_1] or call [PHONE_NUMBER_1].";

    let (buffered, _) = pipeline(StreamStrategy::Buffered);
    let id = ExchangeId::from("buffered");
    buffered.process_request(&id, request.to_string().as_bytes()).unwrap();
    let expected = buffered.process_response_body(&id, reply.as_bytes());
    assert_eq!(
        String::from_utf8(expected.clone()).unwrap(),
        "Noted, John Doe. I will write to john.doe@example.com or call 555-0199."
    );

    for split in 0..=reply.len() {
        let (streaming, _) = pipeline(StreamStrategy::Incremental);
        let id = ExchangeId::new(format!("split-{}", split));
        streaming.process_request(&id, request.to_string().as_bytes()).unwrap();

        let mut rewriter = streaming.begin_response(id.clone(), Some("text/event-stream"));
        let mut out = rewriter.feed(&reply.as_bytes()[..split]).unwrap();
        out.extend(rewriter.feed(&reply.as_bytes()[split..]).unwrap());
        out.extend(rewriter.finish().unwrap());

        assert_eq!(out, expected, "split at {}", split);
        assert!(streaming.store().take_if_present(&id).is_none());
    }
}

#[test]
fn test_store_is_released_after_faulted_response() {
    let audit = Arc::new(MemoryAuditSink::new());
    let config = TrustLayerConfig {
        stream: StreamConfig {
            strategy: StreamStrategy::Buffered,
            max_buffer_bytes: 16,
        },
        ..Default::default()
    };
    let pipeline = ExchangePipeline::new(
        Arc::new(RegexDetector::with_default_rules().unwrap()),
        Arc::new(FlowStore::default()),
        audit,
        config,
    );
    let id = ExchangeId::from("fault");
    pipeline.process_request(&id, SCENARIO.as_bytes()).unwrap();
    let mut rewriter = pipeline.begin_response(id.clone(), None);
    let err = rewriter.feed(&[b'x'; 64]).unwrap_err();
    assert!(matches!(err, TrustLayerError::BufferLimitExceeded { .. }));
    assert!(rewriter.finish().unwrap().is_empty());
    assert!(pipeline.store().take_if_present(&id).is_none());
}

#[test]
fn test_concurrent_exchanges_stay_isolated() {
    let (pipeline, audit) = pipeline(StreamStrategy::Buffered);
    let pipeline = Arc::new(pipeline);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                let id = ExchangeId::new(format!("conc-{}", i));
                let email = format!("user{}@example.com", i);
                let body = json!({"messages": [{"content": format!("reach me at {}", email)}]});
                let outcome = pipeline.process_request(&id, body.to_string().as_bytes()).unwrap();
                let forwarded: Value = serde_json::from_slice(&outcome.body).unwrap();
                assert_eq!(forwarded["messages"][0]["content"], "reach me at [EMAIL_ADDRESS_1]");

                let restored = pipeline.process_response_body(&id, b"ok [EMAIL_ADDRESS_1]");
                assert_eq!(restored, format!("ok {}", email).into_bytes());
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(pipeline.store().is_empty());
    assert_eq!(audit.records().len(), 16);
}
