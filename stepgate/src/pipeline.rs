//! Maps a validated plan's step names onto concrete workflow steps.

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cdc::{DebeziumHealthCheck, DebeziumInspector, KafkaInspector, SchemaHistoryCheck, CHECK_SCHEMA_HISTORY};
use crate::checks::{
    flatten_results, Check, CheckInput, CheckRunner, FnCheck, MySqlCompatCheck, MySqlInspector, SchemaParityCheck,
};
use crate::config::Config;
use crate::finding::Finding;
use crate::plan::{MigrationPlan, StepKind};
use crate::promotion::PromotionGate;
use crate::replica::{ReplicaActions, ReplicaInspector, UpgradeOrchestrator};
use crate::schema::SchemaInspector;
use crate::workflow::{Step, StepContext};

/// External systems the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub schema: Arc<dyn SchemaInspector>,
    pub debezium: Arc<dyn DebeziumInspector>,
    pub replica_inspector: Arc<dyn ReplicaInspector>,
    pub replica_actions: Arc<dyn ReplicaActions>,
    /// Enables the schema-history check when a topic is configured
    pub kafka: Option<Arc<dyn KafkaInspector>>,
    /// Enables the MySQL compatibility check during preflight
    pub mysql: Option<Arc<dyn MySqlInspector>>,
}

struct Inner {
    plan: MigrationPlan,
    config: Config,
    collaborators: Collaborators,
    expected_tables: Vec<String>,
    confirmation: String,
}

/// Builds checks and steps for one plan.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

pub struct PipelineBuilder {
    plan: MigrationPlan,
    config: Config,
    collaborators: Collaborators,
    expected_tables: Vec<String>,
    confirmation: String,
}

impl PipelineBuilder {
    /// Tables the schema history must cover.
    pub fn expected_tables(mut self, tables: Vec<String>) -> Self {
        self.expected_tables = tables;
        self
    }

    /// Phrase supplied by the operator for the `promote` step.
    pub fn confirmation(mut self, phrase: impl Into<String>) -> Self {
        self.confirmation = phrase.into();
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            inner: Arc::new(Inner {
                plan: self.plan,
                config: self.config,
                collaborators: self.collaborators,
                expected_tables: self.expected_tables,
                confirmation: self.confirmation,
            }),
        }
    }
}

impl Pipeline {
    pub fn builder(plan: MigrationPlan, config: Config, collaborators: Collaborators) -> PipelineBuilder {
        PipelineBuilder {
            plan,
            config,
            collaborators,
            expected_tables: Vec::new(),
            confirmation: String::new(),
        }
    }

    pub fn plan(&self) -> &MigrationPlan {
        &self.inner.plan
    }

    /// Input aimed at the plan's first replica.
    pub fn input(&self) -> crate::Result<CheckInput> {
        let replica = self.inner.plan.first_replica()?;
        Ok(CheckInput::from_plan(&self.inner.plan, replica))
    }

    pub fn schema_parity_check(&self) -> Arc<dyn Check> {
        Arc::new(SchemaParityCheck::new(self.inner.collaborators.schema.clone()))
    }

    /// Connector health plus schema-history coverage when configured.
    pub fn cdc_checks(&self) -> Vec<Arc<dyn Check>> {
        let inner = &self.inner;
        let mut checks: Vec<Arc<dyn Check>> = vec![Arc::new(DebeziumHealthCheck::with_config(
            inner.collaborators.debezium.clone(),
            &inner.config.cdc,
        ))];
        match (&inner.collaborators.kafka, &inner.config.cdc.schema_history_topic) {
            (Some(kafka), Some(topic)) => checks.push(Arc::new(SchemaHistoryCheck::new(
                kafka.clone(),
                topic.clone(),
                inner.expected_tables.clone(),
            ))),
            (Some(_), None) => checks.push(Arc::new(FnCheck::new(CHECK_SCHEMA_HISTORY, |_, _| {
                async {
                    Ok::<_, anyhow::Error>(vec![Finding::warn(
                        "schema history inspector configured but cdc.schema_history_topic is not set; check skipped",
                    )])
                }
                .boxed()
            }))),
            (None, _) => {}
        }
        checks
    }

    /// Everything preflight and promotion revalidate.
    pub fn preflight_checks(&self) -> Vec<Arc<dyn Check>> {
        let inner = &self.inner;
        let mut checks = vec![self.schema_parity_check()];
        checks.extend(self.cdc_checks());
        if let Some(mysql) = &inner.collaborators.mysql {
            checks.push(Arc::new(MySqlCompatCheck::new(
                mysql.clone(),
                inner.collaborators.schema.clone(),
                inner.config.compat.clone(),
            )));
        }
        checks
    }

    pub fn promotion_gate(&self) -> PromotionGate {
        PromotionGate::new(self.preflight_checks(), &self.inner.config.promotion)
    }

    pub fn upgrade_orchestrator(&self, state: Arc<dyn stepgate_state::CheckpointStore>) -> UpgradeOrchestrator {
        UpgradeOrchestrator::new(
            self.inner.collaborators.replica_inspector.clone(),
            self.inner.collaborators.replica_actions.clone(),
            state,
            self.inner.plan.topology.primary.clone(),
        )
    }

    /// One step per plan entry, in plan order.
    pub fn steps(&self) -> Vec<Arc<dyn Step>> {
        self.inner
            .plan
            .step_kinds()
            .into_iter()
            .map(|kind| {
                Arc::new(PlanStep {
                    kind,
                    pipeline: self.clone(),
                }) as Arc<dyn Step>
            })
            .collect()
    }
}

struct PlanStep {
    kind: StepKind,
    pipeline: Pipeline,
}

impl PlanStep {
    async fn run_checks(
        &self,
        checks: Vec<Arc<dyn Check>>,
        input: &CheckInput,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<Finding>> {
        let (_, results) = CheckRunner::new(checks).run(input, cancel).await?;
        Ok(flatten_results(&results))
    }

    async fn upgrade_replicas(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
        let orchestrator = self.pipeline.upgrade_orchestrator(ctx.state.clone());
        for replica in &self.pipeline.plan().topology.replicas {
            info!(replica = %replica, "Upgrading replica");
            let report = orchestrator.run(replica, ctx.cancel).await;
            let blocked = report.is_blocked();
            ctx.extend(report.findings);
            if blocked {
                break;
            }
        }
        Ok(())
    }

    async fn validate_replicas(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
        let input = self.pipeline.input()?;
        for replica in &self.pipeline.plan().topology.replicas {
            let findings = self
                .run_checks(vec![self.pipeline.schema_parity_check()], &input.for_replica(replica), ctx.cancel)
                .await?;
            ctx.extend(findings.into_iter().map(|mut f| {
                f.tag("replica", replica);
                f
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl Step for PlanStep {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn mutates(&self) -> bool {
        self.kind.mutates()
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
        match self.kind {
            StepKind::Preflight => {
                let input = self.pipeline.input()?;
                let findings = self.run_checks(self.pipeline.preflight_checks(), &input, ctx.cancel).await?;
                ctx.extend(findings);
            }
            StepKind::UpgradeReplica => self.upgrade_replicas(ctx).await?,
            StepKind::ValidateReplica => self.validate_replicas(ctx).await?,
            StepKind::CdcCheck => {
                let input = self.pipeline.input()?;
                let findings = self.run_checks(self.pipeline.cdc_checks(), &input, ctx.cancel).await?;
                ctx.extend(findings);
            }
            StepKind::Promote => {
                let input = self.pipeline.input()?;
                let report = self
                    .pipeline
                    .promotion_gate()
                    .run(&input, &self.pipeline.inner.confirmation, ctx.cancel)
                    .await?;
                ctx.extend(report.findings);
            }
            StepKind::PostValidation => {
                let input = self.pipeline.input()?;
                let findings = self
                    .run_checks(vec![self.pipeline.schema_parity_check()], &input, ctx.cancel)
                    .await?;
                ctx.extend(findings);
            }
        }
        Ok(())
    }
}
