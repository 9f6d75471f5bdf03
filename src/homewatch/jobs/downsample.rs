// Homewatch - Home monitoring telemetry pipeline
//
// Copyright 2026 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::jobs::runner::{Job, JobContext, JobError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Write;
use std::time::Duration;

/// Copy the last value of each window of recent data for some measurements into
/// another bucket with a Flux query.
///
/// The default settings downsample Fluvius smart meter electricity and gas readings
/// into two minute windows every ten minutes, looking back twenty minutes so that
/// each window is covered by at least two runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownsampleJob {
    pub name: String,
    pub interval: Duration,
    pub source_bucket: String,
    pub output_bucket: String,
    pub measurements: Vec<String>,
    pub lookback: Duration,
    pub window: Duration,
}

impl Default for DownsampleJob {
    fn default() -> Self {
        DownsampleJob {
            name: "downsample_fluvius_smart_meter_data_job".to_owned(),
            interval: Duration::from_secs(10 * 60),
            source_bucket: "fluvius_smart_meter".to_owned(),
            output_bucket: "fluvius_smart_meter_downsampled".to_owned(),
            measurements: vec![
                "fluvius_smart_meter_electricity".to_owned(),
                "fluvius_smart_meter_gas".to_owned(),
            ],
            lookback: Duration::from_secs(20 * 60),
            window: Duration::from_secs(2 * 60),
        }
    }
}

impl DownsampleJob {
    /// Flux script that reads, aggregates, and writes each measurement.
    pub fn flux(&self) -> String {
        let mut flux = String::new();

        // Writing to a String can't fail
        let _ = writeln!(flux, "data =");
        let _ = writeln!(flux, "    from(bucket: {})", flux_string(&self.source_bucket));
        let _ = writeln!(flux, "        |> range(start: -{})", flux_duration(self.lookback));

        for measurement in self.measurements.iter() {
            let _ = writeln!(flux);
            let _ = writeln!(flux, "data");
            let _ = writeln!(
                flux,
                "    |> filter(fn: (r) => r[\"_measurement\"] == {})",
                flux_string(measurement)
            );
            let _ = writeln!(
                flux,
                "    |> aggregateWindow(every: {}, fn: last, createEmpty: false)",
                flux_duration(self.window)
            );
            let _ = writeln!(flux, "    |> to(bucket: {})", flux_string(&self.output_bucket));
        }

        flux
    }
}

#[async_trait]
impl Job for DownsampleJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &JobContext, _state: Value) -> Result<Value, JobError> {
        ctx.db.query(&self.flux()).await?;

        tracing::info!(
            message = "downsampled measurements",
            source = %self.source_bucket,
            output = %self.output_bucket,
            measurements = self.measurements.len(),
        );

        // Nothing to remember between runs
        Ok(Value::Object(Map::new()))
    }
}

/// Format a duration as a Flux duration literal using the largest whole unit.
fn flux_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else if d.subsec_millis() == 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// Quote a string literal for use in a Flux script.
fn flux_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod test {
    use super::{flux_duration, flux_string, DownsampleJob};
    use crate::jobs::runner::test::context;
    use crate::jobs::runner::Job;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_flux_duration() {
        assert_eq!("20m", flux_duration(Duration::from_secs(20 * 60)));
        assert_eq!("2h", flux_duration(Duration::from_secs(2 * 3600)));
        assert_eq!("45s", flux_duration(Duration::from_secs(45)));
        assert_eq!("1500ms", flux_duration(Duration::from_millis(1500)));
    }

    #[test]
    fn test_flux_string() {
        assert_eq!(r#""a \"b\" \\c""#, flux_string(r#"a "b" \c"#));
    }

    #[test]
    fn test_flux_default() {
        let flux = DownsampleJob::default().flux();

        assert!(flux.contains("from(bucket: \"fluvius_smart_meter\")"));
        assert!(flux.contains("|> range(start: -20m)"));
        assert!(flux.contains("r[\"_measurement\"] == \"fluvius_smart_meter_electricity\""));
        assert!(flux.contains("r[\"_measurement\"] == \"fluvius_smart_meter_gas\""));
        assert_eq!(2, flux.matches("aggregateWindow(every: 2m, fn: last, createEmpty: false)").count());
        assert_eq!(2, flux.matches("|> to(bucket: \"fluvius_smart_meter_downsampled\")").count());
    }

    #[tokio::test]
    async fn test_run_queries_database() {
        let (ctx, flux, _) = context();
        let job = DownsampleJob::default();

        let state = job.run(&ctx, json!({})).await.unwrap();

        assert_eq!(json!({}), state);
        assert_eq!(vec![job.flux()], flux.queries.lock().unwrap().clone());
        assert_eq!(Duration::from_secs(600), job.interval());
    }
}
