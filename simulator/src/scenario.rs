//! Scripted ledger scenarios.

use serde::{Deserialize, Serialize};

/// A scripted scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Forced double-entry policy for the book the scenario runs against.
    pub forced_double_entry: bool,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario. Accounts and transactions are referred to by label;
/// splits by their index within the transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Create an account.
    OpenAccount { account: String },
    /// Create an empty transaction posted `days_ago` days before now.
    OpenTransaction { transaction: String, days_ago: i64 },
    /// Append a split.
    AddSplit {
        transaction: String,
        account: String,
        amount: String,
    },
    /// Change a split's amount and rebalance around it.
    EditAmount {
        transaction: String,
        index: usize,
        amount: String,
    },
    /// Remove a split, discard it and rebalance what is left.
    RemoveSplit { transaction: String, index: usize },
    /// Mark a split cleared or reconciled.
    Reconcile {
        transaction: String,
        index: usize,
        state: char,
    },
    /// Commit the transaction's edit session.
    Commit { transaction: String },
    /// Check a condition.
    Assert { condition: AssertCondition },
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssertCondition {
    /// The transaction's splits sum to zero.
    Balanced { transaction: String },
    /// The transaction has exactly this many splits.
    SplitCount { transaction: String, count: usize },
    /// An account's closing value balance equals.
    BalanceEquals { account: String, amount: String },
    /// An account's closing cleared balance equals.
    ClearedBalanceEquals { account: String, amount: String },
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "three-way-split" => Ok(Self::three_way_split()),
            "single-entry" => Ok(Self::single_entry(false)),
            "forced-mirror" => Ok(Self::single_entry(true)),
            "split-removal" => Ok(Self::split_removal()),
            "backdated-balances" => Ok(Self::backdated_balances()),
            _ => Err(anyhow::anyhow!(
                "Unknown scenario: {} (known: {})",
                name,
                Self::names().join(", ")
            )),
        }
    }

    pub fn names() -> &'static [&'static str] {
        &[
            "three-way-split",
            "single-entry",
            "forced-mirror",
            "split-removal",
            "backdated-balances",
        ]
    }

    fn open(accounts: &[&str]) -> Vec<ScenarioStep> {
        accounts
            .iter()
            .map(|a| ScenarioStep::OpenAccount {
                account: a.to_string(),
            })
            .collect()
    }

    fn add(transaction: &str, account: &str, amount: &str) -> ScenarioStep {
        ScenarioStep::AddSplit {
            transaction: transaction.to_string(),
            account: account.to_string(),
            amount: amount.to_string(),
        }
    }

    fn balance(account: &str, amount: &str) -> ScenarioStep {
        ScenarioStep::Assert {
            condition: AssertCondition::BalanceEquals {
                account: account.to_string(),
                amount: amount.to_string(),
            },
        }
    }

    /// A paycheque split three ways, then the source edited.
    fn three_way_split() -> Self {
        let mut steps = Self::open(&["Checking", "Groceries", "Rent"]);
        steps.extend([
            ScenarioStep::OpenTransaction {
                transaction: "paycheque".to_string(),
                days_ago: 1,
            },
            Self::add("paycheque", "Checking", "100"),
            Self::add("paycheque", "Groceries", "-60"),
            Self::add("paycheque", "Rent", "-40"),
            ScenarioStep::EditAmount {
                transaction: "paycheque".to_string(),
                index: 0,
                amount: "150".to_string(),
            },
            ScenarioStep::Commit {
                transaction: "paycheque".to_string(),
            },
            ScenarioStep::Assert {
                condition: AssertCondition::Balanced {
                    transaction: "paycheque".to_string(),
                },
            },
            Self::balance("Groceries", "-110"),
            Self::balance("Rent", "-40"),
        ]);

        Self {
            name: "three-way-split".to_string(),
            description: "Source edit absorbed by the first destination".to_string(),
            forced_double_entry: false,
            steps,
        }
    }

    /// A lone split under either policy.
    fn single_entry(forced: bool) -> Self {
        let mut steps = Self::open(&["Cash"]);
        steps.extend([
            ScenarioStep::OpenTransaction {
                transaction: "deposit".to_string(),
                days_ago: 0,
            },
            Self::add("deposit", "Cash", "50"),
            ScenarioStep::EditAmount {
                transaction: "deposit".to_string(),
                index: 0,
                amount: "50".to_string(),
            },
            ScenarioStep::Commit {
                transaction: "deposit".to_string(),
            },
            ScenarioStep::Assert {
                condition: AssertCondition::SplitCount {
                    transaction: "deposit".to_string(),
                    count: if forced { 2 } else { 1 },
                },
            },
            Self::balance("Cash", if forced { "0" } else { "50" }),
        ]);

        Self {
            name: if forced { "forced-mirror" } else { "single-entry" }.to_string(),
            description: if forced {
                "Lone source split mirrored into a balancing split"
            } else {
                "Lone source split left single-entry"
            }
            .to_string(),
            forced_double_entry: forced,
            steps,
        }
    }

    /// Remove a destination and let the first destination absorb it.
    fn split_removal() -> Self {
        let mut steps = Self::open(&["Checking", "Fuel", "Tolls"]);
        steps.extend([
            ScenarioStep::OpenTransaction {
                transaction: "trip".to_string(),
                days_ago: 2,
            },
            Self::add("trip", "Checking", "-70"),
            Self::add("trip", "Fuel", "50"),
            Self::add("trip", "Tolls", "20"),
            ScenarioStep::RemoveSplit {
                transaction: "trip".to_string(),
                index: 2,
            },
            ScenarioStep::Commit {
                transaction: "trip".to_string(),
            },
            ScenarioStep::Assert {
                condition: AssertCondition::SplitCount {
                    transaction: "trip".to_string(),
                    count: 2,
                },
            },
            Self::balance("Checking", "-70"),
            Self::balance("Fuel", "70"),
            Self::balance("Tolls", "0"),
        ]);

        Self {
            name: "split-removal".to_string(),
            description: "Removed destination folded back into the first".to_string(),
            forced_double_entry: false,
            steps,
        }
    }

    /// Transactions entered out of date order, some cleared.
    fn backdated_balances() -> Self {
        let mut steps = Self::open(&["Checking", "Income"]);
        for (label, days_ago, amount) in [("late", 1, "30"), ("early", 10, "20"), ("mid", 5, "10")]
        {
            steps.extend([
                ScenarioStep::OpenTransaction {
                    transaction: label.to_string(),
                    days_ago,
                },
                Self::add(label, "Checking", amount),
                Self::add(label, "Income", &format!("-{}", amount)),
                ScenarioStep::Commit {
                    transaction: label.to_string(),
                },
            ]);
        }
        steps.extend([
            ScenarioStep::Reconcile {
                transaction: "early".to_string(),
                index: 0,
                state: 'c',
            },
            ScenarioStep::Reconcile {
                transaction: "mid".to_string(),
                index: 0,
                state: 'y',
            },
            Self::balance("Checking", "60"),
            ScenarioStep::Assert {
                condition: AssertCondition::ClearedBalanceEquals {
                    account: "Checking".to_string(),
                    amount: "30".to_string(),
                },
            },
        ]);

        Self {
            name: "backdated-balances".to_string(),
            description: "Running balances follow posted date, not entry order".to_string(),
            forced_double_entry: false,
            steps,
        }
    }
}
