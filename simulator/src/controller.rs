//! Simulation controller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use splitbook_common::{AccountId, Amount, SharePrice, SplitId, TransactionId};
use splitbook_ledger::{Book, LedgerConfig, RebalanceOutcome, ReconcileState};

use crate::metrics::SimulationMetrics;
use crate::scenario::{AssertCondition, Scenario, ScenarioStep};

/// Outcome of the post-run consistency sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Verification {
    /// Transactions inspected.
    pub transactions: usize,
    /// Lone-source transactions left unbalanced by policy.
    pub single_entry: usize,
    /// Transactions unbalanced with more than one split.
    pub unbalanced: usize,
    /// Accounts whose second recompute differed from the first.
    pub unstable_accounts: usize,
    /// Accounts holding index entries for splits that are gone.
    pub stale_indexes: usize,
    /// Sum of account closing balances.
    pub accounts_total: Decimal,
    /// Sum of transaction totals.
    pub transactions_total: Decimal,
}

impl Verification {
    pub fn is_consistent(&self) -> bool {
        self.unbalanced == 0
            && self.unstable_accounts == 0
            && self.stale_indexes == 0
            && self.accounts_total == self.transactions_total
    }
}

/// Controls the simulation.
pub struct SimulationController {
    /// The book under test.
    book: Arc<Book>,
    /// Accounts created by `initialize`.
    accounts: Arc<Vec<AccountId>>,
    /// Base seed; worker `n` uses `seed + n`.
    seed: u64,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(config: LedgerConfig, seed: Option<u64>) -> Self {
        Self {
            book: Arc::new(Book::new(config)),
            accounts: Arc::new(Vec::new()),
            seed: seed.unwrap_or_else(rand::random),
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Initialize the simulation.
    pub async fn initialize(&mut self, account_count: usize) -> anyhow::Result<()> {
        if account_count == 0 {
            anyhow::bail!("At least one account is required");
        }

        info!("Initializing simulation with {} accounts", account_count);

        let accounts = (0..account_count)
            .map(|i| self.book.create_account(format!("Account {:03}", i)))
            .collect();
        self.accounts = Arc::new(accounts);

        Ok(())
    }

    /// Run the random workload across `workers` concurrent tasks.
    pub async fn run(&self, transactions: usize, workers: usize, edits: usize) -> anyhow::Result<()> {
        let workers = workers.max(1);
        let per_worker = transactions.div_ceil(workers);

        info!(
            workers,
            transactions, edits, seed = self.seed, "Running random workload"
        );

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let book = self.book.clone();
            let accounts = self.accounts.clone();
            let seed = self.seed.wrapping_add(worker as u64);
            let count = per_worker.min(transactions.saturating_sub(worker * per_worker));

            handles.push(tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut metrics = SimulationMetrics::new();
                for _ in 0..count {
                    run_transaction(&book, &accounts, &mut rng, edits, &mut metrics);
                    tokio::task::yield_now().await;
                }
                debug!(worker, transactions = count, "Worker finished");
                metrics
            }));
        }

        for handle in handles {
            let worker_metrics = handle.await?;
            self.metrics.write().await.merge(&worker_metrics);
        }

        Ok(())
    }

    /// Sweep the whole book for broken invariants.
    pub async fn verify(&self) -> Verification {
        let mut verification = Verification::default();
        let epsilon = self.book.config().balance_epsilon;

        for transaction_id in self.book.transaction_ids() {
            let Some(transaction) = self.book.transaction(transaction_id) else {
                continue;
            };
            verification.transactions += 1;
            let imbalance = match transaction.imbalance(epsilon) {
                Ok(imbalance) => imbalance,
                Err(e) => {
                    warn!(transaction_id = %transaction_id, error = %e, "Transaction total overflows");
                    verification.unbalanced += 1;
                    continue;
                }
            };
            verification.transactions_total += transaction.total().unwrap_or_default();

            if !imbalance.is_zero() {
                if transaction.len() == 1 {
                    verification.single_entry += 1;
                } else {
                    warn!(
                        transaction_id = %transaction_id,
                        imbalance = %imbalance,
                        "Transaction does not sum to zero"
                    );
                    verification.unbalanced += 1;
                }
            }
        }

        self.book.recompute_dirty();

        for account_id in self.accounts.iter().copied() {
            let (first, second) = match (
                self.book.recompute_balances(account_id),
                self.book.recompute_balances(account_id),
            ) {
                (Ok(first), Ok(second)) => (first, second),
                _ => continue,
            };
            if first != second {
                warn!(account = %account_id, "Running balances not idempotent");
                verification.unstable_accounts += 1;
            }
            verification.accounts_total += first.balance;

            let indexed = self
                .book
                .account(account_id)
                .map(|a| a.entries().len())
                .unwrap_or_default();
            let live = self
                .book
                .account_splits(account_id)
                .map(|s| s.len())
                .unwrap_or_default();
            if indexed != live {
                warn!(account = %account_id, indexed, live, "Account index holds dead splits");
                verification.stale_indexes += 1;
            }
        }

        verification
    }

    /// Run a scripted scenario against this controller's book.
    pub async fn run_scenario(&self, scenario: Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        let mut labels = Labels::default();
        for step in &scenario.steps {
            self.execute_step(step, &mut labels).await?;
        }

        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&self, step: &ScenarioStep, labels: &mut Labels) -> anyhow::Result<()> {
        let book = &self.book;

        match step {
            ScenarioStep::OpenAccount { account } => {
                let id = book.create_account(account.clone());
                labels.accounts.insert(account.clone(), id);
            }
            ScenarioStep::OpenTransaction {
                transaction,
                days_ago,
            } => {
                let id = book.create_transaction();
                book.set_description(id, transaction.clone())?;
                book.set_date_posted(id, splitbook_common::now() - Duration::days(*days_ago))?;
                labels.transactions.insert(transaction.clone(), id);
            }
            ScenarioStep::AddSplit {
                transaction,
                account,
                amount,
            } => {
                let transaction_id = labels.transaction(transaction)?;
                let account_id = labels.account(account)?;
                book.add_split(transaction_id, account_id, Decimal::from_str_exact(amount)?)?;
            }
            ScenarioStep::EditAmount {
                transaction,
                index,
                amount,
            } => {
                let split_id = self.split_at(labels.transaction(transaction)?, *index)?;
                book.set_split_amount(split_id, Decimal::from_str_exact(amount)?)?;
                let outcome = book.rebalance(split_id)?;
                info!("Rebalanced {}: {:?}", transaction, outcome);
            }
            ScenarioStep::RemoveSplit { transaction, index } => {
                let transaction_id = labels.transaction(transaction)?;
                let split_id = self.split_at(transaction_id, *index)?;
                let split = book.remove_split(transaction_id, split_id)?;
                book.discard_split(split)?;
                let outcome = book.rebalance_transaction(transaction_id)?;
                info!("Rebalanced {} after removal: {:?}", transaction, outcome);
            }
            ScenarioStep::Reconcile {
                transaction,
                index,
                state,
            } => {
                let split_id = self.split_at(labels.transaction(transaction)?, *index)?;
                let state = ReconcileState::from_char(*state)
                    .ok_or_else(|| anyhow::anyhow!("Unknown reconcile code: {}", state))?;
                book.set_reconciled(split_id, state, splitbook_common::now())?;
            }
            ScenarioStep::Commit { transaction } => {
                book.commit_edit(labels.transaction(transaction)?)?;
            }
            ScenarioStep::Assert { condition } => {
                self.check(condition, labels)?;
                info!("Assertion held: {:?}", condition);
            }
        }

        Ok(())
    }

    fn check(&self, condition: &AssertCondition, labels: &Labels) -> anyhow::Result<()> {
        let book = &self.book;

        match condition {
            AssertCondition::Balanced { transaction } => {
                let imbalance = book.imbalance(labels.transaction(transaction)?)?;
                if !imbalance.is_zero() {
                    anyhow::bail!("{} is off by {}", transaction, imbalance);
                }
            }
            AssertCondition::SplitCount { transaction, count } => {
                let actual = book
                    .transaction(labels.transaction(transaction)?)
                    .map(|t| t.len())
                    .unwrap_or_default();
                if actual != *count {
                    anyhow::bail!("{} has {} splits, expected {}", transaction, actual, count);
                }
            }
            AssertCondition::BalanceEquals { account, amount } => {
                let expected = Decimal::from_str_exact(amount)?;
                let actual = book.account_balances(labels.account(account)?)?.balance;
                if actual != expected {
                    anyhow::bail!("{} balance is {}, expected {}", account, actual, expected);
                }
            }
            AssertCondition::ClearedBalanceEquals { account, amount } => {
                let expected = Decimal::from_str_exact(amount)?;
                let actual = book
                    .account_balances(labels.account(account)?)?
                    .cleared_balance;
                if actual != expected {
                    anyhow::bail!(
                        "{} cleared balance is {}, expected {}",
                        account,
                        actual,
                        expected
                    );
                }
            }
        }

        Ok(())
    }

    fn split_at(&self, transaction_id: TransactionId, index: usize) -> anyhow::Result<SplitId> {
        self.book
            .transaction(transaction_id)
            .and_then(|t| t.splits().get(index).map(|s| s.id()))
            .ok_or_else(|| anyhow::anyhow!("No split {} in {}", index, transaction_id))
    }

    /// Get simulation metrics.
    pub async fn get_metrics(&self) -> SimulationMetrics {
        self.metrics.read().await.clone()
    }
}

#[derive(Default)]
struct Labels {
    accounts: HashMap<String, AccountId>,
    transactions: HashMap<String, TransactionId>,
}

impl Labels {
    fn account(&self, label: &str) -> anyhow::Result<AccountId> {
        self.accounts
            .get(label)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Unknown account: {}", label))
    }

    fn transaction(&self, label: &str) -> anyhow::Result<TransactionId> {
        self.transactions
            .get(label)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Unknown transaction: {}", label))
    }
}

fn random_amount(rng: &mut StdRng) -> Amount {
    Decimal::new(rng.gen_range(-1_000_000..1_000_000), 2)
}

/// Build one transaction, apply random edits and commit it.
fn run_transaction(
    book: &Book,
    accounts: &[AccountId],
    rng: &mut StdRng,
    edits: usize,
    metrics: &mut SimulationMetrics,
) {
    let transaction_id = book.create_transaction();
    metrics.transactions += 1;

    let posted = splitbook_common::now() - Duration::days(rng.gen_range(0..365));
    let splits = rng.gen_range(1..=4);
    let result = book.set_date_posted(transaction_id, posted).and_then(|_| {
        for _ in 0..splits {
            let account = accounts[rng.gen_range(0..accounts.len())];
            book.add_split(transaction_id, account, random_amount(rng))?;
        }
        Ok(())
    });
    if let Err(e) = result {
        warn!(error = %e, "Transaction setup rejected");
        metrics.contract_errors += 1;
        return;
    }
    rebalance(metrics, || book.rebalance_transaction(transaction_id));

    for _ in 0..edits {
        let Some(transaction) = book.transaction(transaction_id) else {
            break;
        };
        let split_ids: Vec<SplitId> = transaction.splits().iter().map(|s| s.id()).collect();
        let Some(&split_id) = split_ids.get(rng.gen_range(0..split_ids.len().max(1))) else {
            break;
        };

        let result = match rng.gen_range(0..5) {
            0 => book
                .set_split_amount(split_id, random_amount(rng))
                .map(|_| rebalance(metrics, || book.rebalance(split_id))),
            1 => {
                let price = SharePrice::new(Decimal::new(rng.gen_range(1..10_000), 2));
                price.and_then(|p| book.set_share_price(split_id, p))
            }
            2 => {
                let account = accounts[rng.gen_range(0..accounts.len())];
                book.set_split_account(split_id, account).map(|_| ())
            }
            3 => {
                let state = match rng.gen_range(0..3) {
                    0 => ReconcileState::NotReconciled,
                    1 => ReconcileState::Cleared,
                    _ => ReconcileState::Reconciled,
                };
                book.set_reconciled(split_id, state, splitbook_common::now())
            }
            _ if split_ids.len() > 1 => book
                .remove_split(transaction_id, split_id)
                .and_then(|split| book.discard_split(split))
                .map(|_| {
                    metrics.removals += 1;
                    rebalance(metrics, || book.rebalance_transaction(transaction_id))
                }),
            _ => Ok(()),
        };

        match result {
            Ok(()) => metrics.edits += 1,
            Err(e) => {
                warn!(split_id = %split_id, error = %e, "Edit rejected");
                metrics.contract_errors += 1;
            }
        }
    }

    if let Err(e) = book.commit_edit(transaction_id) {
        warn!(error = %e, "Commit rejected");
        metrics.contract_errors += 1;
    }
}

fn rebalance(
    metrics: &mut SimulationMetrics,
    op: impl FnOnce() -> splitbook_common::Result<RebalanceOutcome>,
) {
    let started = Instant::now();
    let result = op();
    metrics.record_rebalance(started.elapsed().as_micros() as u64);

    match result {
        Ok(RebalanceOutcome::MirrorCreated { .. }) => metrics.mirrors_created += 1,
        Ok(RebalanceOutcome::SingleEntry { .. }) => metrics.single_entry += 1,
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "Rebalance rejected");
            metrics.contract_errors += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_named_scenarios_pass() {
        for name in Scenario::names() {
            let scenario = Scenario::load(name).unwrap();
            let config = LedgerConfig {
                forced_double_entry: scenario.forced_double_entry,
                ..LedgerConfig::default()
            };
            let controller = SimulationController::new(config, Some(1));
            controller.run_scenario(scenario).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_random_workload_is_consistent() {
        let mut controller = SimulationController::new(LedgerConfig::default(), Some(7));
        controller.initialize(5).await.unwrap();
        controller.run(60, 3, 8).await.unwrap();

        let verification = controller.verify().await;
        let metrics = controller.get_metrics().await;

        assert_eq!(verification.transactions, 60);
        assert!(verification.is_consistent(), "{:?}", verification);
        assert!(metrics.is_clean(), "{:?}", metrics);
    }

    #[tokio::test]
    async fn test_forced_workload_has_no_single_entry() {
        let config = LedgerConfig {
            forced_double_entry: true,
            ..LedgerConfig::default()
        };
        let mut controller = SimulationController::new(config, Some(11));
        controller.initialize(3).await.unwrap();
        controller.run(40, 2, 4).await.unwrap();

        let verification = controller.verify().await;
        assert_eq!(verification.single_entry, 0);
        assert!(verification.is_consistent(), "{:?}", verification);
    }
}
