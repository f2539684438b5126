//! The propose → evaluate → report driver.

use std::net::{SocketAddr, ToSocketAddrs};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use cinder_net::{SearchClient, SearchServer};
use cinder_search::{Constraint, SaController};
use cinder_types::{
    ratios_to_tokens, tokens_to_ratios, CinderError, CinderResult, RangeTable,
};

use crate::config::TunerConfig;
use crate::evaluate::{Evaluator, Rollback};

/// Book-keeping for one trial driven through the facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: Uuid,
    pub trial_number: usize,
    pub tokens: Vec<i64>,
    pub ratios: Vec<f64>,
    pub reward: Option<f64>,
    pub proposed_at: DateTime<Utc>,
    pub reported_at: Option<DateTime<Utc>>,
}

struct Outstanding {
    tokens: Vec<i64>,
    trial_index: usize,
}

/// Orchestrates a search session for one worker process.
///
/// When `is_server` is set the tuner hosts the co-located [`SearchServer`]
/// and self-configures its client from the bound address; otherwise it only
/// connects to the configured address. All search state lives at the server
/// either way.
pub struct AutoTuner {
    config: TunerConfig,
    client: SearchClient,
    server: Option<SearchServer>,
    outstanding: Option<Outstanding>,
    rollback: Option<Box<dyn Rollback>>,
    trials: Vec<TrialRecord>,
}

impl AutoTuner {
    /// Create a tuner starting the search at `init_ratios`.
    ///
    /// The initial point is required; the tuner does not derive one from a
    /// pruning or FLOPs budget. `constraint` is the feasibility predicate
    /// handed to the co-located controller (ignored in client mode, where
    /// the server already has one).
    pub async fn new(
        config: TunerConfig,
        init_ratios: Vec<f64>,
        constraint: Box<dyn Constraint>,
    ) -> CinderResult<Self> {
        if init_ratios.is_empty() {
            return Err(CinderError::Config(
                "init_ratios must name at least one dimension".to_string(),
            ));
        }

        let (server, addr) = if config.is_server {
            let table = RangeTable::new(
                config.min_ratios.clone(),
                config.max_ratios.clone(),
                init_ratios.len(),
                config.step,
            )?;
            let init_tokens = ratios_to_tokens(&init_ratios, config.step);
            let controller =
                SaController::new(table, init_tokens, config.sa_config(), constraint)?;
            let server = SearchServer::start(config.server_config(), controller).await?;
            let addr = server.addr();
            (Some(server), addr)
        } else {
            (None, resolve(&config.server_host, config.server_port)?)
        };

        info!(%addr, key = %config.key, is_server = config.is_server, "tuner ready");
        let client = SearchClient::new(addr, config.key.clone());
        Ok(Self {
            config,
            client,
            server,
            outstanding: None,
            rollback: None,
            trials: Vec::new(),
        })
    }

    /// Fetch the next candidate and decode it into the ratio domain.
    pub async fn propose_trial(&mut self) -> CinderResult<Vec<f64>> {
        if self.outstanding.is_some() {
            return Err(CinderError::Config(
                "previous trial has not been reported".to_string(),
            ));
        }

        let tokens = self.client.next_tokens().await?;
        let ratios = tokens_to_ratios(&tokens, self.config.step);
        let trial_number = self.trials.len();
        info!(trial = trial_number, ?ratios, "trial proposed");

        self.outstanding = Some(Outstanding {
            tokens: tokens.clone(),
            trial_index: trial_number,
        });
        self.trials.push(TrialRecord {
            id: Uuid::new_v4(),
            trial_number,
            tokens,
            ratios: ratios.clone(),
            reward: None,
            proposed_at: Utc::now(),
            reported_at: None,
        });
        Ok(ratios)
    }

    /// Register the guard that undoes the current trial's side effects.
    pub fn set_rollback(&mut self, rollback: Box<dyn Rollback>) {
        self.rollback = Some(rollback);
    }

    /// Report the reward for the outstanding trial.
    ///
    /// Restores any registered rollback first, then sends the exact token
    /// vector the trial was proposed with. On a transport failure the trial
    /// stays outstanding so the caller can report again.
    pub async fn report(&mut self, reward: f64) -> CinderResult<()> {
        let outstanding = self.outstanding.take().ok_or_else(|| {
            CinderError::Config("no outstanding trial to report".to_string())
        })?;

        if let Some(mut rollback) = self.rollback.take() {
            rollback.restore()?;
        }

        if let Err(err) = self.client.update(&outstanding.tokens, reward).await {
            warn!(error = %err, "report failed; trial stays outstanding");
            self.outstanding = Some(outstanding);
            return Err(err);
        }

        let record = &mut self.trials[outstanding.trial_index];
        record.reward = Some(reward);
        record.reported_at = Some(Utc::now());
        info!(trial = outstanding.trial_index, reward, "trial reported");
        Ok(())
    }

    /// Drive the full loop until the server's budget is exhausted or
    /// `max_trials` trials have run locally.
    pub async fn run(
        &mut self,
        evaluator: &mut dyn Evaluator,
        max_trials: usize,
    ) -> CinderResult<()> {
        for _ in 0..max_trials {
            let ratios = match self.propose_trial().await {
                Ok(ratios) => ratios,
                Err(CinderError::SearchExhausted(detail)) => {
                    info!(%detail, "search budget exhausted");
                    break;
                }
                Err(err) => return Err(err),
            };
            let reward = evaluator.evaluate(&ratios).await?;
            self.report(reward).await?;
        }
        Ok(())
    }

    /// All trials this process has driven, in order.
    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// The local trial with the highest reported reward.
    pub fn best_trial(&self) -> Option<&TrialRecord> {
        self.trials
            .iter()
            .filter(|t| t.reward.is_some())
            .max_by(|a, b| {
                a.reward
                    .partial_cmp(&b.reward)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Address of the co-located server, when hosting one.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.addr())
    }
}

fn resolve(host: &str, port: u16) -> CinderResult<SocketAddr> {
    if host.is_empty() {
        return Err(CinderError::Config(
            "client mode requires an explicit server host".to_string(),
        ));
    }
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| CinderError::Config(format!("no address found for {host}:{port}")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use cinder_search::Unconstrained;
    use cinder_types::{CinderError, CinderResult};

    use super::*;
    use crate::evaluate::{Evaluator, RatioConstraint, Rollback};

    fn local_config(search_steps: u64) -> TunerConfig {
        TunerConfig::default()
            .with_server_address("127.0.0.1", 0)
            .with_search_steps(search_steps)
            .with_key("tuner-test")
    }

    /// Rewards the total amount pruned, so higher ratios win.
    struct SumEvaluator {
        calls: usize,
    }

    #[async_trait]
    impl Evaluator for SumEvaluator {
        async fn evaluate(&mut self, ratios: &[f64]) -> CinderResult<f64> {
            self.calls += 1;
            Ok(ratios.iter().sum())
        }
    }

    struct FlagRollback(Arc<AtomicBool>);

    impl Rollback for FlagRollback {
        fn restore(&mut self) -> CinderResult<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn propose_report_round_trip() {
        let mut tuner = AutoTuner::new(
            local_config(20),
            vec![0.3, 0.3],
            Box::new(Unconstrained),
        )
        .await
        .unwrap();

        let ratios = tuner.propose_trial().await.unwrap();
        assert_eq!(ratios.len(), 2);
        assert!(ratios.iter().all(|r| (0.0..=0.9).contains(r)), "{ratios:?}");

        tuner.report(0.42).await.unwrap();
        let trials = tuner.trials();
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].reward, Some(0.42));
        assert!(trials[0].reported_at.is_some());
    }

    #[tokio::test]
    async fn report_without_trial_is_an_error() {
        let mut tuner =
            AutoTuner::new(local_config(20), vec![0.3], Box::new(Unconstrained))
                .await
                .unwrap();
        assert!(matches!(
            tuner.report(0.5).await,
            Err(CinderError::Config(_))
        ));
    }

    #[tokio::test]
    async fn double_propose_is_an_error() {
        let mut tuner =
            AutoTuner::new(local_config(20), vec![0.3], Box::new(Unconstrained))
                .await
                .unwrap();
        tuner.propose_trial().await.unwrap();
        assert!(matches!(
            tuner.propose_trial().await,
            Err(CinderError::Config(_))
        ));
    }

    #[tokio::test]
    async fn rollback_runs_before_the_report_lands() {
        let mut tuner =
            AutoTuner::new(local_config(20), vec![0.3], Box::new(Unconstrained))
                .await
                .unwrap();
        let restored = Arc::new(AtomicBool::new(false));

        tuner.propose_trial().await.unwrap();
        tuner.set_rollback(Box::new(FlagRollback(restored.clone())));
        tuner.report(0.5).await.unwrap();

        assert!(restored.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn run_stops_at_the_budget() {
        let mut tuner = AutoTuner::new(
            local_config(3),
            vec![0.3, 0.4],
            Box::new(Unconstrained),
        )
        .await
        .unwrap();
        let mut evaluator = SumEvaluator { calls: 0 };

        tuner.run(&mut evaluator, 10).await.unwrap();

        assert_eq!(evaluator.calls, 3);
        assert_eq!(tuner.trials().len(), 3);
        assert!(tuner.trials().iter().all(|t| t.reward.is_some()));
        assert!(tuner.best_trial().is_some());
    }

    #[tokio::test]
    async fn worker_process_against_external_server() {
        // One process hosts, a second config connects as a pure client.
        let host = AutoTuner::new(
            local_config(10),
            vec![0.2, 0.2],
            Box::new(RatioConstraint::new(
                |ratios: &[f64]| ratios.iter().sum::<f64>() < 1.8,
                0.01,
            )),
        )
        .await
        .unwrap();
        let addr = host.server_addr().unwrap();

        let mut worker = AutoTuner::new(
            TunerConfig::default()
                .with_key("tuner-test")
                .as_client(&addr.ip().to_string(), addr.port()),
            vec![0.2, 0.2],
            Box::new(Unconstrained),
        )
        .await
        .unwrap();

        let mut evaluator = SumEvaluator { calls: 0 };
        worker.run(&mut evaluator, 4).await.unwrap();
        assert_eq!(worker.trials().len(), 4);
    }

    #[tokio::test]
    async fn empty_init_ratios_rejected() {
        let result =
            AutoTuner::new(local_config(10), Vec::new(), Box::new(Unconstrained)).await;
        assert!(matches!(result, Err(CinderError::Config(_))));
    }
}
