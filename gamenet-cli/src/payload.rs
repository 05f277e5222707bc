//! Sample game payloads for the sender
//!
//! Channel and payload shape are picked from a seeded RNG so a run can be
//! repeated exactly.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;

/// Shape of a generated payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Packet index as a 4-byte big-endian integer
    Numeric,
    /// `msg-<index>`
    Text,
    /// Small JSON object
    Json,
}

impl SampleKind {
    const ALL: [SampleKind; 3] = [SampleKind::Numeric, SampleKind::Text, SampleKind::Json];

    pub fn name(self) -> &'static str {
        match self {
            SampleKind::Numeric => "num",
            SampleKind::Text => "str",
            SampleKind::Json => "json",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Serialize)]
struct JsonBody<'a> {
    id: u32,
    ts: f64,
    text: &'a str,
}

/// One generated packet
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub reliable: bool,
    pub kind: SampleKind,
    pub payload: Bytes,
}

/// Seeded source of sample packets
#[derive(Debug)]
pub struct PayloadGenerator {
    rng: StdRng,
    reliable_ratio: f64,
}

impl PayloadGenerator {
    pub fn new(seed: u64, reliable_ratio: f64) -> Self {
        PayloadGenerator {
            rng: StdRng::seed_from_u64(seed),
            reliable_ratio,
        }
    }

    /// Generate packet number `index`, stamping JSON bodies with `now`
    pub fn sample(&mut self, index: u32, now: f64) -> Result<Sample, serde_json::Error> {
        let reliable = self.rng.gen::<f64>() < self.reliable_ratio;
        let kind = SampleKind::ALL[self.rng.gen_range(0..SampleKind::ALL.len())];

        let payload = match kind {
            SampleKind::Numeric => Bytes::copy_from_slice(&index.to_be_bytes()),
            SampleKind::Text => Bytes::from(format!("msg-{}", index)),
            SampleKind::Json => {
                let text = format!("payload-{}", index);
                Bytes::from(serde_json::to_vec(&JsonBody {
                    id: index,
                    ts: now,
                    text: &text,
                })?)
            }
        };

        Ok(Sample {
            reliable,
            kind,
            payload,
        })
    }
}
