//! Apollo tracing extension (`extensions.tracing`, version 1).
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value as Json, json};

use crate::error::PathSegment;

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy, Default)]
struct Phase {
    start: Duration,
    end: Duration,
}

impl Phase {
    fn to_json(self) -> Json {
        json!({"startOffset": nanos(self.start), "duration": nanos(self.end.saturating_sub(self.start))})
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResolverTiming {
    pub path: Vec<PathSegment>,
    pub parent_type: String,
    pub field_name: String,
    pub return_type: String,
    pub start_offset: u64,
    pub duration: u64,
}

#[derive(Debug)]
pub(crate) struct Timing {
    started: Instant,
    start_time: DateTime<Utc>,
    parsing: Phase,
    validation: Phase,
    resolvers: Vec<ResolverTiming>,
}

impl Timing {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            start_time: Utc::now(),
            parsing: Phase::default(),
            validation: Phase::default(),
            resolvers: Vec::new(),
        }
    }

    pub fn offset(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn parsed(&mut self, start: Duration) {
        self.parsing = Phase { start, end: self.offset() };
    }

    pub fn validated(&mut self, start: Duration) {
        self.validation = Phase { start, end: self.offset() };
    }

    pub fn resolver(&mut self, start: Duration, mut entry: ResolverTiming) {
        entry.start_offset = nanos(start);
        entry.duration = nanos(self.offset().saturating_sub(start));
        self.resolvers.push(entry);
    }

    pub fn into_extension(self) -> Json {
        let elapsed = self.offset();
        let end_time = self.start_time + chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero());
        json!({
            "version": 1,
            "startTime": self.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            "endTime": end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            "duration": nanos(elapsed),
            "parsing": self.parsing.to_json(),
            "validation": self.validation.to_json(),
            "execution": {"resolvers": serde_json::to_value(&self.resolvers).unwrap_or_default()},
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_shape() {
        let mut timing = Timing::start();
        timing.parsed(Duration::ZERO);
        timing.validated(timing.offset());
        timing.resolver(
            timing.offset(),
            ResolverTiming {
                path: vec![PathSegment::Field("hello".into())],
                parent_type: "Query".into(),
                field_name: "hello".into(),
                return_type: "String!".into(),
                start_offset: 0,
                duration: 0,
            },
        );
        let ext = timing.into_extension();
        assert_eq!(ext["version"], 1);
        assert!(ext["startTime"].as_str().unwrap().ends_with('Z'));
        let resolvers = ext["execution"]["resolvers"].as_array().unwrap();
        assert_eq!(resolvers[0]["returnType"], "String!");
        assert_eq!(resolvers[0]["path"], json!(["hello"]));
        assert!(ext["parsing"]["duration"].is_u64());
    }
}
