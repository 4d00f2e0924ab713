//! Lock-gated composite action.
//!
//! Acquires a lease on a named distributed lock before running its inner
//! action set. Without the lease the inner actions are skipped entirely. On
//! completion the lease is either released or, when a run frequency is
//! configured, renewed for the remainder of that frequency so the work is
//! not repeated until the next window.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use runbook_model::{Context, ExecuteContext, ModelManipulator, ParseContext};

use crate::actions::set::{ActionSetDef, SetCore};
use crate::defs::{ActionRef, Validatable};
use crate::error::ActionError;
use crate::external::LockManager;
use crate::factory::ActionFactory;
use crate::op::{extract_args, report_missing_params, ActionInfo, ActionKind};
use crate::store::ActionFetcher;

pub const ACTION_TYPE: &str = "LOCK-TABLE";

/// Arguments bound through the reference's argument transform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
struct LockArgs {
    lock_name: String,
    lock_group_name: String,
    lease_time_secs: i64,
    run_frequency_secs: Option<i64>,
    report_continue_on_lock_failure: bool,
}

impl Validatable for LockArgs {
    fn validate_and_normalize(&mut self, ctx: &dyn Context) -> bool {
        let mut result = true;

        self.lock_name = self.lock_name.trim().to_string();
        self.lock_group_name = self.lock_group_name.trim().to_string();

        if self.lock_name.is_empty() {
            ctx.log_error("must specify a non-empty lock name");
            result = false;
        }

        if self.lock_group_name.is_empty() {
            ctx.log_error("must specify a non-empty lock group name");
            result = false;
        }

        if self.lease_time_secs <= 0 {
            ctx.log_error("Lease time must be greater than 0");
            result = false;
        }

        result
    }
}

/// The lock-gated composite.
pub struct LockActionSet {
    core: SetCore,
    manipulator: ModelManipulator,
    locks: Arc<dyn LockManager>,
}

impl LockActionSet {
    pub fn new(locks: Arc<dyn LockManager>) -> Self {
        Self {
            core: SetCore::new(),
            manipulator: ModelManipulator::new(),
            locks,
        }
    }
}

#[async_trait]
impl ActionKind for LockActionSet {
    type Def = ActionSetDef;

    fn type_name(&self) -> &'static str {
        ACTION_TYPE
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["lock_group_name", "lock_name", "lease_time_secs"]
    }

    fn process_definition(
        &self,
        ctx: &ParseContext,
        factory: &dyn ActionFactory,
        info: &ActionInfo,
        definition: Option<Self::Def>,
    ) -> bool {
        match definition {
            Some(def) => self.core.parse_definition(ctx, factory, info, &def),
            None => false,
        }
    }

    fn expand(&self, ctx: &ParseContext, store: &dyn ActionFetcher, info: &ActionInfo) -> bool {
        self.core.expand(ctx, store, info)
    }

    fn process_validation(&self, ctx: &ParseContext, _info: &ActionInfo, missing: &[&str]) -> bool {
        let missing_ok = report_missing_params(ctx, missing);
        self.core.validate_children(ctx) && missing_ok
    }

    async fn execute_internal(
        &self,
        ctx: &ExecuteContext,
        info: &ActionInfo,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError> {
        let args: LockArgs = extract_args(ctx, &self.manipulator, info, action_ref, model)?;

        // the holder identity is scoped to this execution call
        let holder = Uuid::new_v4().to_string();
        let lease_time = StdDuration::from_secs(args.lease_time_secs as u64);

        let lease = self
            .locks
            .attempt_acquire(
                &args.lock_group_name,
                &args.lock_name,
                &holder,
                lease_time,
                true,
            )
            .await
            .map_err(ActionError::external)?;

        let Some(lease) = lease else {
            ctx.log(&format!(
                "Unable to acquire lock [{}] in group [{}]; skipping inner actions",
                args.lock_name, args.lock_group_name
            ));
            return Ok((args.report_continue_on_lock_failure, None));
        };

        // a lease must never be abandoned held: release before propagating a
        // cancellation that raced the acquisition
        if ctx.is_cancelled() {
            let _ = lease.release(false).await;
            return Err(ActionError::Cancelled);
        }

        let should_continue = match self.core.execute_children(ctx, model).await {
            Ok(flag) => flag,
            Err(err) => {
                let _ = lease.release(false).await;
                return Err(err);
            }
        };

        let extension = args
            .run_frequency_secs
            .map(|secs| Duration::seconds(secs) - ctx.duration());

        match extension {
            Some(remaining) if remaining > Duration::zero() => {
                let remaining = remaining.to_std().unwrap_or_default();
                lease
                    .renew(remaining)
                    .await
                    .map_err(ActionError::external)?;
                ctx.log(&format!(
                    "Renewed lock [{}] for {}s to cover the remaining run frequency",
                    args.lock_name,
                    remaining.as_secs()
                ));
            }
            _ => {
                lease.release(false).await.map_err(ActionError::external)?;
            }
        }

        Ok((should_continue, None))
    }
}
