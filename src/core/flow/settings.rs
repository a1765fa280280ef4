//! Engine settings derived from the file configuration

use crate::config::SyncConfig;
use crate::core::calculate::{LinearScale, OverrideTransform};
use crate::core::overrides::OverridePolicy;
use crate::core::submit::{PerRecordPolicy, PollPolicy, DEFAULT_BATCH_THRESHOLD};
use crate::core::verification::VerifyPolicy;
use crate::domain::ids::MeasurementId;
use crate::domain::{ExclusionSet, ResourceKind, ResourceSpec, Result, SyncError, TargetResources};
use std::sync::Arc;
use std::time::Duration;

/// Names and scoring of the resources setup looks for
#[derive(Debug, Clone, PartialEq)]
pub struct SetupNames {
    pub outcome_title: String,
    pub container_title: String,
    pub criterion_description: String,
    pub mastery_points: f64,
    pub points_possible: f64,
}

impl Default for SetupNames {
    fn default() -> Self {
        Self {
            outcome_title: "Current Mastery".to_string(),
            container_title: "Current Mastery Score".to_string(),
            criterion_description: "Overall mastery".to_string(),
            mastery_points: 3.0,
            points_possible: 4.0,
        }
    }
}

/// Everything a flow run needs besides its collaborators
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub setup: SetupNames,
    pub exclusions: ExclusionSet,
    pub batch_threshold: usize,
    pub per_record: PerRecordPolicy,
    pub poll: PollPolicy,
    pub verify: VerifyPolicy,

    /// `None` disables the override channel
    pub overrides: Option<OverridePolicy>,
    pub transform: Arc<dyn OverrideTransform>,

    /// Create missing resources without asking
    pub auto_create: bool,

    /// Check and calculate only
    pub dry_run: bool,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            setup: SetupNames::default(),
            exclusions: ExclusionSet::default(),
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            per_record: PerRecordPolicy::default(),
            poll: PollPolicy::default(),
            verify: VerifyPolicy::default(),
            overrides: Some(OverridePolicy::default()),
            transform: Arc::new(LinearScale::new(25.0)),
            auto_create: false,
            dry_run: false,
        }
    }
}

impl FlowSettings {
    /// Build settings from a validated configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let excluded_ids = config
            .calculation
            .excluded_measurement_ids
            .iter()
            .map(|id| MeasurementId::new(id.as_str()))
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(SyncError::Configuration)?;

        let verify = VerifyPolicy {
            tolerance: config.verification.tolerance,
            max_attempts: config.verification.max_attempts,
            wait: Duration::from_millis(config.verification.wait_ms),
        };

        let overrides = config.overrides.enabled.then(|| OverridePolicy {
            max_attempts: config.overrides.max_attempts,
            verify: VerifyPolicy {
                tolerance: config.verification.tolerance,
                max_attempts: config.overrides.verify_retries,
                wait: Duration::from_millis(config.overrides.verify_delay_ms),
            },
        });

        Ok(Self {
            setup: SetupNames {
                outcome_title: config.setup.outcome_title.clone(),
                container_title: config.setup.container_title.clone(),
                criterion_description: config.setup.criterion_description.clone(),
                mastery_points: config.setup.mastery_points,
                points_possible: config.setup.points_possible,
            },
            exclusions: ExclusionSet::new(excluded_ids, &config.calculation.excluded_label_substrings),
            batch_threshold: config.submission.batch_threshold,
            per_record: PerRecordPolicy {
                max_attempts: config.submission.max_attempts,
                deferred_pass_delay: Duration::from_millis(config.submission.deferred_pass_delay_ms),
            },
            poll: PollPolicy {
                interval: Duration::from_millis(config.submission.poll_interval_ms),
                timeout: Duration::from_secs(config.submission.poll_timeout_seconds),
            },
            verify,
            overrides,
            transform: Arc::new(LinearScale::new(config.overrides.scale_factor)),
            auto_create: config.setup.auto_create,
            dry_run: config.application.dry_run,
        })
    }

    /// What to look for, or create, for one resource kind
    pub fn resource_spec(&self, kind: ResourceKind, resolved: &TargetResources) -> ResourceSpec {
        let (name, description) = match kind {
            ResourceKind::Outcome => (
                self.setup.outcome_title.clone(),
                Some("Mean of all scored assignments".to_string()),
            ),
            ResourceKind::Container => (self.setup.container_title.clone(), None),
            ResourceKind::Criterion => (self.setup.criterion_description.clone(), None),
        };
        ResourceSpec {
            kind,
            name,
            description,
            mastery_points: self.setup.mastery_points,
            points_possible: self.setup.points_possible,
            resolved: resolved.clone(),
        }
    }
}
