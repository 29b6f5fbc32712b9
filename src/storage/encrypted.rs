//! SQLite-backed store with AES-GCM encryption of alert payloads.
//! Key derived from a device-bound secret (in production: Secure Enclave /
//! Keystore / DPAPI). The registry table is append-only: the first record
//! per path wins, duplicates are ignored at the constraint level.

use crate::dispatch::{Alert, MaliciousFileRecord};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Lowercase label for an enum serialized as a plain JSON string.
fn json_label<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_value(value)?
        .as_str()
        .unwrap_or("unknown")
        .to_string())
}

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String, aes_gcm::Error> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| aes_gcm::Error)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher.encrypt((&nonce).into(), plaintext)?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>, StoreError> {
    let raw = BASE64.decode(encoded)?;
    if raw.len() < NONCE_LEN {
        return Err("payload too short".into());
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| format!("{:?}", e))?;
    Ok(cipher
        .decrypt(nonce.into(), ct)
        .map_err(|e| format!("{:?}", e))?)
}

pub struct AlertStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl AlertStore {
    /// Open or create DB at path. Key is derived from `secret`.
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_ts ON alerts(ts);
            CREATE TABLE IF NOT EXISTS malicious_files (
                path TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                reason TEXT NOT NULL
            );
            "#,
        )?;
        let key = derive_key(secret);
        Ok(Self {
            conn: Mutex::new(conn),
            key,
        })
    }

    /// Insert or update an alert (full payload stored encrypted).
    pub fn upsert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let payload = serde_json::to_string(alert)?;
        let enc = encrypt(&self.key, payload.as_bytes()).map_err(|e| format!("{:?}", e))?;
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO alerts (id, ts, kind, severity, status, payload_enc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                alert.id,
                alert.timestamp.timestamp_millis(),
                alert.kind,
                json_label(&alert.severity)?,
                json_label(&alert.status)?,
                enc
            ],
        )?;
        Ok(())
    }

    /// Read one alert back (decrypt payload).
    pub fn get_alert(&self, id: &str) -> Result<Option<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT payload_enc FROM alerts WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            let enc: String = row.get(0)?;
            let plain = decrypt(&self.key, &enc)?;
            return Ok(Some(serde_json::from_slice(&plain)?));
        }
        Ok(None)
    }

    /// First sighting wins; later inserts for the same path are no-ops.
    pub fn insert_malicious_file(&self, record: &MaliciousFileRecord) -> Result<(), StoreError> {
        self.conn.lock().unwrap().execute(
            "INSERT OR IGNORE INTO malicious_files (path, ts, reason) VALUES (?1, ?2, ?3)",
            params![
                record.path,
                record.timestamp.timestamp_millis(),
                record.reason
            ],
        )?;
        Ok(())
    }

    pub fn malicious_file_count(&self) -> Result<u64, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM malicious_files", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Retention: delete alerts older than given timestamp (ms).
    pub fn prune_before(&self, ts: i64) -> Result<u64, rusqlite::Error> {
        let n = self
            .conn
            .lock()
            .unwrap()
            .execute("DELETE FROM alerts WHERE ts < ?1", params![ts])?;
        Ok(n as u64)
    }
}
