use std::fmt;

/// A product area with its own storage directory, writer worker and upload loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Logs,
    Tracing,
    Rum,
    Crash,
}

impl Feature {
    pub const ALL: [Feature; 4] = [Feature::Logs, Feature::Tracing, Feature::Rum, Feature::Crash];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Logs => "logs",
            Feature::Tracing => "tracing",
            Feature::Rum => "rum",
            Feature::Crash => "crash",
        }
    }

    /// Intake path appended to the configured site. Crash reports travel as logs.
    pub fn intake_path(&self) -> &'static str {
        match self {
            Feature::Logs | Feature::Crash => "/api/v2/logs",
            Feature::Tracing => "/api/v2/spans",
            Feature::Rum => "/api/v2/rum",
        }
    }

    pub fn granted_dir_name(&self) -> String {
        format!("{}-v1", self.name())
    }

    pub fn pending_dir_name(&self) -> String {
        format!("{}-pending-v1", self.name())
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
