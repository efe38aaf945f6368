//! Fixture vector generator for Object Drive keying.
//!
//! Writes `tests/fixtures/test_vectors.json`. Every vector that has a SQL
//! counterpart is derived twice, once through `odrive-crypto` and once through
//! the functions registered on a SQLite connection, and generation fails if
//! the two disagree. Key rotation runs as SQL, so this is what keeps stored
//! rows readable by the application.
//!
//! Usage:
//!   odrive-testvec              # Generate test_vectors.json
//!   odrive-testvec --verify     # Verify test vectors match expected values

use std::collections::BTreeMap;

use anyhow::{bail, Context};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use odrive_crypto::digest;
use odrive_crypto::keys::{FileKey, MasterKey};
use odrive_crypto::mac::{self, CrudsFlags};
use odrive_crypto::passphrase;
use odrive_types::grantee::Grantee;
use odrive_types::snippet::{SnippetField, Snippets, Treatment};

const FIXTURE_PATH: &str = "tests/fixtures/test_vectors.json";

const MASTER: &str = "odrive fixture master";
const ROTATED_MASTER: &str = "odrive fixture rotated master";
const IV: [u8; 32] = [0x11; 32];
const FILE_KEY: [u8; 32] = [0x22; 32];
const OBJECT_ID: [u8; 16] = [0x33; 16];

#[derive(Serialize, Deserialize)]
struct TestVectors {
    version: String,
    generated_by: String,
    vectors: BTreeMap<String, TestVector>,
}

#[derive(Serialize, Deserialize)]
struct TestVector {
    description: String,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

fn entries<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn master(passphrase: &str) -> anyhow::Result<MasterKey> {
    MasterKey::from_passphrase(passphrase).context("fixture master key")
}

/// Fail unless the application and SQL derivations agree.
fn agree(name: &str, app: &[u8], sql: &[u8]) -> anyhow::Result<()> {
    if app != sql {
        bail!(
            "{name}: application {} != sql {}",
            hex::encode(app),
            hex::encode(sql)
        );
    }
    Ok(())
}

fn sql_blob(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> anyhow::Result<Vec<u8>> {
    conn.query_row(sql, params, |row| row.get(0))
        .with_context(|| format!("sql derivation: {sql}"))
}

fn generate_passphrase_vectors(conn: &Connection) -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();
    let mk = master(MASTER)?;
    let key = FileKey::from_bytes(FILE_KEY);

    // Vector 1: wrap one file key
    let wrapped = passphrase::wrap_file_key(&mk, &IV, &key)?;
    let sql = sql_blob(
        conn,
        "SELECT od_apply_passphrase(?1, ?2, ?3)",
        rusqlite::params![mk.as_bytes(), &IV[..], &FILE_KEY[..]],
    )?;
    agree("apply_passphrase_wrap", &wrapped, &sql)?;
    vectors.insert(
        "apply_passphrase_wrap".to_string(),
        TestVector {
            description: "ApplyPassphrase(master, iv=0x11*32, file_key=0x22*32)".to_string(),
            inputs: entries([
                ("master_key", MASTER.to_string()),
                ("iv", hex::encode(IV)),
                ("file_key", hex::encode(FILE_KEY)),
            ]),
            outputs: entries([("encrypt_key", hex::encode(&wrapped))]),
        },
    );

    // Vector 2: a 70-byte input spans three keystream blocks
    let long_input: Vec<u8> = (0u8..70).collect();
    let long = passphrase::apply_passphrase(&mk, &IV, &long_input)?;
    let sql = sql_blob(
        conn,
        "SELECT od_apply_passphrase(?1, ?2, ?3)",
        rusqlite::params![mk.as_bytes(), &IV[..], &long_input],
    )?;
    agree("apply_passphrase_multiblock", &long, &sql)?;
    vectors.insert(
        "apply_passphrase_multiblock".to_string(),
        TestVector {
            description: "ApplyPassphrase over 0x00..0x45, three keystream blocks".to_string(),
            inputs: entries([
                ("master_key", MASTER.to_string()),
                ("iv", hex::encode(IV)),
                ("data", hex::encode(&long_input)),
            ]),
            outputs: entries([("output", hex::encode(&long))]),
        },
    );

    // Vector 3: rows written before IVs were keyed by the grantee DN
    let dn = "cn=alice,ou=people,o=example";
    let legacy = passphrase::apply_passphrase(&mk, dn.as_bytes(), &FILE_KEY)?;
    let recovered = passphrase::legacy_unwrap_file_key(&mk, dn, &legacy)?;
    agree("legacy_unwrap", recovered.as_bytes(), &FILE_KEY)?;
    vectors.insert(
        "legacy_dn_keyed_wrap".to_string(),
        TestVector {
            description: "Legacy wrap: ApplyPassphrase(master, iv=dn, file_key)".to_string(),
            inputs: entries([
                ("master_key", MASTER.to_string()),
                ("distinguished_name", dn.to_string()),
                ("file_key", hex::encode(FILE_KEY)),
            ]),
            outputs: entries([("encrypt_key", hex::encode(&legacy))]),
        },
    );

    // Vector 4: rotation as the SQL rewrite composes it
    let rotated = master(ROTATED_MASTER)?;
    let rewrapped = passphrase::rewrap(&mk, &rotated, &IV, &wrapped)?;
    let sql = sql_blob(
        conn,
        "SELECT od_apply_passphrase(?2, ?3, od_apply_passphrase(?1, ?3, ?4))",
        rusqlite::params![mk.as_bytes(), rotated.as_bytes(), &IV[..], &wrapped],
    )?;
    agree("rotation_rewrap", &rewrapped, &sql)?;
    agree(
        "rotation_preserves_key",
        passphrase::unwrap_file_key(&rotated, &IV, &rewrapped)?.as_bytes(),
        &FILE_KEY,
    )?;
    vectors.insert(
        "rotation_rewrap".to_string(),
        TestVector {
            description: "wrap(new, iv, wrap(old, iv, encrypt_key))".to_string(),
            inputs: entries([
                ("old_master_key", MASTER.to_string()),
                ("new_master_key", ROTATED_MASTER.to_string()),
                ("iv", hex::encode(IV)),
                ("encrypt_key", hex::encode(&wrapped)),
            ]),
            outputs: entries([("encrypt_key", hex::encode(&rewrapped))]),
        },
    );

    Ok(vectors)
}

fn generate_mac_vectors(conn: &Connection) -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();
    let mk = master(MASTER)?;
    let wrapped = passphrase::wrap_file_key(&mk, &IV, &FileKey::from_bytes(FILE_KEY))?;

    let cases: [(&str, &str, Grantee, CrudsFlags); 2] = [
        (
            "permission_mac_full",
            "Owner grant: all five capabilities",
            Grantee::user("cn=alice,ou=people,o=example"),
            [true; 5],
        ),
        (
            "permission_mac_read_share",
            "Project group grant: read and share only",
            Grantee::project_group("dctc", Some("DCTC".to_string()), "ODrive"),
            [false, true, false, false, true],
        ),
    ];

    for (name, description, grantee, cruds) in cases {
        let flat = grantee.flatten();
        let app = mac::do_mac(&mk, &IV, &flat, cruds, &wrapped)?;
        let [c, r, u, d, s] = cruds;
        let sql = sql_blob(
            conn,
            "SELECT od_permission_mac(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![mk.as_bytes(), &IV[..], flat, c, r, u, d, s, &wrapped],
        )?;
        agree(name, &app, &sql)?;
        let flags: String = cruds.iter().map(|b| if *b { '1' } else { '0' }).collect();
        vectors.insert(
            name.to_string(),
            TestVector {
                description: description.to_string(),
                inputs: entries([
                    ("master_key", MASTER.to_string()),
                    ("iv", hex::encode(IV)),
                    ("grantee", flat.clone()),
                    ("cruds", flags),
                    ("encrypt_key", hex::encode(&wrapped)),
                ]),
                outputs: entries([
                    ("permission_mac", hex::encode(app)),
                    ("fingerprint", digest::fingerprint(&app)),
                ]),
            },
        );
    }

    Ok(vectors)
}

fn generate_digest_vectors(conn: &Connection) -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    let (count, modified) = (3i64, 1_491_004_800_000i64);
    let token = digest::change_token(&OBJECT_ID, count, modified);
    let sql: String = conn
        .query_row(
            "SELECT od_change_token(?1, ?2, ?3)",
            rusqlite::params![&OBJECT_ID[..], count, modified],
            |row| row.get(0),
        )
        .context("sql change token")?;
    agree("change_token", token.as_bytes(), sql.as_bytes())?;
    vectors.insert(
        "change_token".to_string(),
        TestVector {
            description: "hex(BLAKE3(LP(id) || LP(LE64(count)) || LP(LE64(modified))))"
                .to_string(),
            inputs: entries([
                ("id", hex::encode(OBJECT_ID)),
                ("change_count", count.to_string()),
                ("modified_date", modified.to_string()),
            ]),
            outputs: entries([("change_token", token)]),
        },
    );

    let snippets = Snippets(vec![
        SnippetField::new("f_clearance", Treatment::Allowed, &["u", "c"]),
        SnippetField::new("f_sci_ctrls", Treatment::Disallow, &["hcs", "si"]),
        SnippetField::new("f_share", Treatment::Allowed, &["cusou", "dctc_odrive"]),
    ]);
    let canonical = snippets.canonical_string();
    vectors.insert(
        "snippet_digest".to_string(),
        TestVector {
            description: "SHA-256 of the canonical snippet string".to_string(),
            inputs: entries([("canonical", canonical.clone())]),
            outputs: entries([("hash", digest::snippet_digest(&canonical))]),
        },
    );

    Ok(vectors)
}

fn generate_grantee_vectors() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();
    let cases = [
        ("grantee_user", Grantee::user("CN=Bob Smith,OU=People,O=U.S. Government")),
        (
            "grantee_project_group",
            Grantee::project_group("dctc", Some("DCTC".to_string()), "ODrive-G1"),
        ),
        ("grantee_group", Grantee::group("-Everyone")),
    ];
    for (name, grantee) in cases {
        vectors.insert(
            name.to_string(),
            TestVector {
                description: "aacFlatten join key and resource name".to_string(),
                inputs: entries([(
                    "grantee",
                    serde_json::to_string(&grantee).unwrap_or_default(),
                )]),
                outputs: entries([
                    ("flattened", grantee.flatten()),
                    ("resource_name", grantee.resource_name()),
                ]),
            },
        );
    }
    vectors
}

fn generate_all_vectors() -> anyhow::Result<TestVectors> {
    let conn = odrive_db::open_memory().context("open fixture database")?;
    let mut all_vectors = BTreeMap::new();

    all_vectors.extend(generate_passphrase_vectors(&conn)?);
    all_vectors.extend(generate_mac_vectors(&conn)?);
    all_vectors.extend(generate_digest_vectors(&conn)?);
    all_vectors.extend(generate_grantee_vectors());

    Ok(TestVectors {
        version: "1.0".to_string(),
        generated_by: "odrive-testvec".to_string(),
        vectors: all_vectors,
    })
}

fn verify_vectors(vectors: &TestVectors) -> anyhow::Result<bool> {
    let regenerated = generate_all_vectors()?;
    let mut all_pass = true;

    for (name, expected) in &vectors.vectors {
        match regenerated.vectors.get(name) {
            Some(actual) if actual.outputs == expected.outputs => eprintln!("PASS: {name}"),
            Some(actual) => {
                eprintln!("FAIL: {name}");
                eprintln!("  expected: {:?}", expected.outputs);
                eprintln!("  actual:   {:?}", actual.outputs);
                all_pass = false;
            }
            None => {
                eprintln!("MISSING: {name}");
                all_pass = false;
            }
        }
    }

    Ok(all_pass)
}

fn write_vectors(vectors: &TestVectors) -> anyhow::Result<()> {
    if let Some(parent) = std::path::Path::new(FIXTURE_PATH).parent() {
        std::fs::create_dir_all(parent).context("create fixture directory")?;
    }
    let json = serde_json::to_string_pretty(vectors)?;
    std::fs::write(FIXTURE_PATH, json).with_context(|| format!("write {FIXTURE_PATH}"))?;
    eprintln!("Generated {} test vectors to {FIXTURE_PATH}", vectors.vectors.len());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let verify = std::env::args().any(|a| a == "--verify");

    let vectors = match std::fs::read_to_string(FIXTURE_PATH) {
        Ok(content) if verify => serde_json::from_str(&content).context("parse fixture JSON")?,
        _ => {
            if verify {
                eprintln!("No existing test vectors found at {FIXTURE_PATH}. Generating...");
            }
            let vectors = generate_all_vectors()?;
            write_vectors(&vectors)?;
            vectors
        }
    };

    if !verify_vectors(&vectors)? {
        eprintln!("Test vector verification FAILED.");
        std::process::exit(1);
    }
    eprintln!("All test vectors verified successfully.");
    Ok(())
}
