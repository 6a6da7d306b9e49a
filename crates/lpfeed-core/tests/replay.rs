use lpfeed_core::normalize::mark_outgoing;
use lpfeed_core::wire::{parse_group_update, parse_user_update};
use lpfeed_core::{AccountId, AccountKind, UpdateBatch, UpdateResponse, dedup_batch};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    #[allow(dead_code)]
    description: String,
    account_id: AccountId,
    response: Value,
    expected: Expected,
}

/// Shape of the batch after decoding, normalization and dedup.
#[derive(Debug, Deserialize)]
struct Expected {
    records: usize,
    /// `(peer_id, conversation_message_id)` of surviving additions, in order.
    additions: Vec<(i64, i64)>,
    reactions: usize,
    #[serde(default)]
    outgoing: Vec<(i64, i64)>,
}

fn fixtures_dir() -> PathBuf {
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../fixtures/responses")
}

fn load_fixtures() -> Vec<Fixture> {
    let dir = fixtures_dir();
    let mut fixtures = Vec::new();
    if !dir.exists() {
        return fixtures;
    }
    for entry in fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let content = fs::read_to_string(&path).unwrap_or_else(|e| {
                panic!("failed to read fixture {:?}: {}", path, e);
            });
            let fixture: Fixture = serde_json::from_str(&content).unwrap_or_else(|e| {
                panic!("failed to parse fixture {:?}: {}", path, e);
            });
            fixtures.push(fixture);
        }
    }
    fixtures.sort_by(|a, b| a.name.cmp(&b.name));
    fixtures
}

fn replay(fixture: &Fixture) -> UpdateBatch {
    let response = UpdateResponse::from_value(fixture.response.clone()).unwrap();
    let parse = match fixture.account_id.kind() {
        AccountKind::User => parse_user_update,
        AccountKind::Group => parse_group_update,
    };
    let records = response.updates.iter().filter_map(parse).collect();
    let mut batch = UpdateBatch::new(fixture.account_id, records);
    if fixture.account_id.kind() == AccountKind::User {
        mark_outgoing(fixture.account_id, &mut batch);
    }
    dedup_batch(&mut batch);
    batch
}

#[test]
fn test_all_fixtures() {
    let fixtures = load_fixtures();
    assert!(!fixtures.is_empty(), "no fixtures found in {:?}", fixtures_dir());

    let mut failed = Vec::new();
    for fixture in &fixtures {
        let batch = replay(fixture);
        let additions: Vec<(i64, i64)> = batch
            .message_additions()
            .map(|m| (m.peer_id, m.conversation_message_id))
            .collect();
        let outgoing: Vec<(i64, i64)> = batch
            .message_additions()
            .filter(|m| m.is_out)
            .map(|m| (m.peer_id, m.conversation_message_id))
            .collect();

        let ok = batch.len() == fixture.expected.records
            && additions == fixture.expected.additions
            && batch.reaction_changes().count() == fixture.expected.reactions
            && outgoing == fixture.expected.outgoing;
        if !ok {
            eprintln!(
                "FAIL: fixture '{}': records={} additions={:?} outgoing={:?}, expected {:?}",
                fixture.name,
                batch.len(),
                additions,
                outgoing,
                fixture.expected
            );
            failed.push(fixture.name.clone());
        }
    }

    assert!(failed.is_empty(), "failed fixtures: {:?}", failed);
}
