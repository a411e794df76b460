/// Highest progress reported while a stream is still open.
pub const STREAMING_PROGRESS_CAP: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySettings {
    /// Token count treated as "done" when the backend sends no explicit progress.
    pub expected_token_budget: u64,
    /// Advisory rate used for the cost estimate. Not billing data.
    pub per_token_rate_usd: f64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            expected_token_budget: 2_000,
            per_token_rate_usd: 0.000_015,
        }
    }
}

/// Derives progress, token count and an estimated cost for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEstimator {
    settings: TelemetrySettings,
    progress: f64,
    tokens: u64,
    explicit_progress: bool,
}

impl TelemetryEstimator {
    pub fn new(settings: TelemetrySettings) -> Self {
        Self {
            settings,
            progress: 0.0,
            tokens: 0,
            explicit_progress: false,
        }
    }

    pub fn reset(&mut self) {
        self.progress = 0.0;
        self.tokens = 0;
        self.explicit_progress = false;
    }

    /// One content token arrived.
    pub fn on_token(&mut self) {
        self.tokens += 1;
        if !self.explicit_progress {
            let budget = self.settings.expected_token_budget.max(1) as f64;
            self.raise(self.tokens as f64 / budget);
        }
    }

    pub fn on_checkpoint(&mut self, progress: Option<f64>, tokens: Option<u64>) {
        if let Some(reported) = tokens {
            self.tokens = self.tokens.max(reported);
        }
        match progress {
            Some(fraction) => {
                self.explicit_progress = true;
                self.raise(fraction);
            }
            None if !self.explicit_progress => {
                let budget = self.settings.expected_token_budget.max(1) as f64;
                self.raise(self.tokens as f64 / budget);
            }
            None => {}
        }
    }

    /// The attempt finished; a reported token count is authoritative.
    pub fn on_complete(&mut self, tokens: Option<u64>) {
        if let Some(reported) = tokens {
            self.tokens = reported;
        }
        self.progress = 1.0;
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    pub fn estimated_cost_usd(&self) -> f64 {
        self.tokens as f64 * self.settings.per_token_rate_usd
    }

    pub fn settings(&self) -> TelemetrySettings {
        self.settings
    }

    fn raise(&mut self, candidate: f64) {
        let capped = candidate.clamp(0.0, STREAMING_PROGRESS_CAP);
        if capped > self.progress {
            self.progress = capped;
        }
    }
}
