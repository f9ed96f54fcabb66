// nws_lookup - Current conditions from api.weather.gov for a street address
//
// Copyright 2022 Nick Pillitteri
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

use crate::pipeline::LookupError;
use crate::types::ObservationReading;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::time::Duration;

const OUTCOME_SUCCESS: &str = "success";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: String,
}

pub struct LookupMetrics {
    requests: Family<OutcomeLabels, Counter>,
    duration: Histogram,
}

impl LookupMetrics {
    /// Create a new `LookupMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let requests = Family::<OutcomeLabels, Counter>::default();
        // 50ms up to ~12.8s, four sequential upstream calls per lookup
        let duration = Histogram::new(exponential_buckets(0.05, 2.0, 9));

        reg.register(
            "nws_lookup_requests",
            "Address lookups by outcome",
            requests.clone(),
        );
        reg.register(
            "nws_lookup_duration_seconds",
            "Time taken to complete an address lookup, in seconds",
            duration.clone(),
        );

        Self { requests, duration }
    }

    /// Count the outcome of a lookup and record how long it took.
    pub fn observe(&self, result: &Result<ObservationReading, LookupError>, elapsed: Duration) {
        let outcome = match result {
            Ok(_) => OUTCOME_SUCCESS,
            Err(e) => e.reason(),
        };

        self.requests
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_owned(),
            })
            .inc();
        self.duration.observe(elapsed.as_secs_f64());
    }
}
