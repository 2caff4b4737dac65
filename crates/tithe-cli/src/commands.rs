use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tithe_director::{StakedToken, YieldDirector};
use tithe_ledger::{DonationRecord, IndexSource, LedgerAuditor, RebasingToken};
use tithe_types::{AccountId, Circulating, Principal, RebaseIndex};

use crate::cli::*;

/// Internal account holding all donated principal.
const CUSTODY_LABEL: &str = "@custody";

/// On-disk snapshot. Accounts are stored by label and re-derived on load;
/// balances are principal units (gons), so a later rebase needs no rewrite
/// of the file.
#[derive(Serialize, Deserialize)]
struct StateFile {
    index: RebaseIndex,
    balances: BTreeMap<String, Principal>,
    donations: Vec<(String, String, DonationRecord)>,
}

impl StateFile {
    fn fresh() -> Self {
        Self {
            index: RebaseIndex::ONE,
            balances: BTreeMap::new(),
            donations: Vec::new(),
        }
    }
}

/// A loaded state file, hydrated into a live director plus the label book
/// needed to write it back out.
struct World {
    director: YieldDirector<StakedToken>,
    labels: BTreeMap<AccountId, String>,
}

impl World {
    fn load(path: &str) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read state file {path} (run `tithe init`?)"))?;
        let state: StateFile =
            serde_json::from_str(&raw).with_context(|| format!("malformed state file {path}"))?;
        Self::from_state(state)
    }

    fn from_state(state: StateFile) -> anyhow::Result<Self> {
        let mut labels = BTreeMap::new();
        let mut balances = Vec::new();
        for (label, gons) in state.balances {
            let id = AccountId::from_label(&label);
            labels.insert(id.clone(), label);
            balances.push((id, gons));
        }
        let entries: Vec<_> = state
            .donations
            .into_iter()
            .map(|(donor, recipient, record)| {
                let donor_id = AccountId::from_label(&donor);
                let recipient_id = AccountId::from_label(&recipient);
                labels.insert(donor_id.clone(), donor);
                labels.insert(recipient_id.clone(), recipient);
                (donor_id, recipient_id, record)
            })
            .collect();

        let token = StakedToken::from_parts(state.index, balances);
        let ledger = tithe_ledger::DonationLedger::from_entries(entries)
            .context("state file fails ledger consistency checks")?;
        let custody = AccountId::from_label(CUSTODY_LABEL);
        labels.insert(custody.clone(), CUSTODY_LABEL.to_string());
        Ok(Self {
            director: YieldDirector::with_ledger(token, custody, ledger),
            labels,
        })
    }

    fn save(&self, path: &str) -> anyhow::Result<()> {
        let (index, balances) = self.director.token().parts();
        let mut state = StateFile {
            index,
            balances: BTreeMap::new(),
            donations: Vec::new(),
        };
        for (id, gons) in balances {
            state.balances.insert(self.label(&id)?, gons);
        }
        for (donor, recipient, record) in self.director.ledger().entries() {
            state
                .donations
                .push((self.label(donor)?, self.label(recipient)?, record.clone()));
        }
        let raw = serde_json::to_string_pretty(&state)?;
        fs::write(path, raw).with_context(|| format!("cannot write state file {path}"))?;
        Ok(())
    }

    /// Resolve a user-supplied label, recording it for the next save.
    fn account(&mut self, label: &str) -> anyhow::Result<AccountId> {
        if label == CUSTODY_LABEL {
            bail!("{CUSTODY_LABEL} is reserved");
        }
        let id = AccountId::from_label(label);
        self.labels.insert(id.clone(), label.to_string());
        Ok(id)
    }

    fn label(&self, id: &AccountId) -> anyhow::Result<String> {
        self.labels
            .get(id)
            .cloned()
            .with_context(|| format!("no label on record for account {id}"))
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init(args) => cmd_init(&cli.state, args),
        Command::Mint(args) => cmd_mint(&cli.state, args),
        Command::Rebase(args) => cmd_rebase(&cli.state, args),
        Command::Deposit(args) => cmd_deposit(&cli.state, args),
        Command::Withdraw(args) => cmd_withdraw(&cli.state, args),
        Command::WithdrawAll(args) => cmd_withdraw_all(&cli.state, args),
        Command::Redeem(args) => cmd_redeem(&cli.state, args),
        Command::Report(args) => cmd_report(&cli.state, args),
        Command::Verify(_) => cmd_verify(&cli.state),
    }
}

fn cmd_init(path: &str, args: InitArgs) -> anyhow::Result<()> {
    if Path::new(path).exists() && !args.force {
        bail!("{path} already exists (pass --force to overwrite)");
    }
    let world = World::from_state(StateFile::fresh())?;
    world.save(path)?;
    println!(
        "{} Initialized tithe state in {} at index {}",
        "✓".green().bold(),
        path.bold(),
        "1.0".cyan()
    );
    Ok(())
}

fn cmd_mint(path: &str, args: MintArgs) -> anyhow::Result<()> {
    let mut world = World::load(path)?;
    let account = world.account(&args.account)?;
    world
        .director
        .token_mut()
        .mint(&account, Circulating::new(args.amount))?;
    world.save(path)?;
    println!(
        "{} Minted {} to {} (balance {})",
        "✓".green().bold(),
        args.amount.to_string().bold(),
        args.account.yellow(),
        world.director.token().balance_of(&account)
    );
    Ok(())
}

fn cmd_rebase(path: &str, args: RebaseArgs) -> anyhow::Result<()> {
    let mut world = World::load(path)?;
    let next = RebaseIndex::from_decimal_str(&args.index)
        .with_context(|| format!("invalid index {:?}", args.index))?;
    world.director.token_mut().rebase(next)?;
    world.save(path)?;
    println!("{} Index advanced to {}", "✓".green().bold(), next.to_string().cyan());
    Ok(())
}

fn cmd_deposit(path: &str, args: DepositArgs) -> anyhow::Result<()> {
    let mut world = World::load(path)?;
    let donor = world.account(&args.donor)?;
    let recipient = world.account(&args.recipient)?;
    // The CLI owns every account, so the custody pull is pre-approved.
    let custody = world.director.custody().clone();
    world
        .director
        .token_mut()
        .approve(&donor, &custody, Circulating::new(u128::MAX));
    world
        .director
        .deposit(&donor, &recipient, Principal::new(args.amount))?;
    world.save(path)?;
    println!(
        "{} {} donated {} principal to {}",
        "✓".green().bold(),
        args.donor.yellow(),
        args.amount.to_string().bold(),
        args.recipient.yellow()
    );
    Ok(())
}

fn cmd_withdraw(path: &str, args: WithdrawArgs) -> anyhow::Result<()> {
    let mut world = World::load(path)?;
    let donor = world.account(&args.donor)?;
    let recipient = world.account(&args.recipient)?;
    let realized = world
        .director
        .withdraw(&donor, &recipient, Principal::new(args.amount))?;
    world.save(path)?;
    println!(
        "{} {} withdrew {} principal from the {} donation (yield {} paid out)",
        "✓".green().bold(),
        args.donor.yellow(),
        args.amount.to_string().bold(),
        args.recipient.yellow(),
        realized.to_string().cyan()
    );
    Ok(())
}

fn cmd_withdraw_all(path: &str, args: WithdrawAllArgs) -> anyhow::Result<()> {
    let mut world = World::load(path)?;
    let donor = world.account(&args.donor)?;
    let withdrawn = world.director.withdraw_all(&donor)?;
    world.save(path)?;
    println!(
        "{} {} withdrew all donations ({} principal)",
        "✓".green().bold(),
        args.donor.yellow(),
        withdrawn.to_string().bold()
    );
    Ok(())
}

fn cmd_redeem(path: &str, args: RedeemArgs) -> anyhow::Result<()> {
    let mut world = World::load(path)?;
    let recipient = world.account(&args.recipient)?;
    let payout = match &args.donor {
        Some(donor) => {
            let donor = world.account(donor)?;
            world.director.redeem_yield(&recipient, &donor)?
        }
        None => world.director.redeem_all(&recipient)?,
    };
    world.save(path)?;
    println!(
        "{} {} redeemed {} yield",
        "✓".green().bold(),
        args.recipient.yellow(),
        payout.to_string().cyan().bold()
    );
    Ok(())
}

fn cmd_report(path: &str, args: ReportArgs) -> anyhow::Result<()> {
    let mut world = World::load(path)?;
    let filter = match &args.account {
        Some(label) => Some(world.account(label)?),
        None => None,
    };
    let director = &world.director;

    println!("Index: {}", director.token().current_index().to_string().cyan().bold());
    println!("\n{}", "Balances".bold());
    let (_, balances) = director.token().parts();
    for (id, _) in &balances {
        if filter.as_ref().is_some_and(|f| f != id) {
            continue;
        }
        println!(
            "  {:<16} {}",
            world.label(id)?.yellow(),
            director.token().balance_of(id)
        );
    }

    println!("\n{}", "Donations".bold());
    for (donor, recipient, record) in director.ledger().entries() {
        if filter.as_ref().is_some_and(|f| f != donor && f != recipient) {
            continue;
        }
        let yield_owed = record.yield_owed(director.token())?;
        println!(
            "  {} {} {}  principal {}  yield {}",
            world.label(donor)?.yellow(),
            "->".dimmed(),
            world.label(recipient)?.yellow(),
            record.principal.to_string().bold(),
            yield_owed.to_string().cyan()
        );
    }

    println!("\n{}", "Redeemable".bold());
    for recipient in director.ledger().registry().recipients() {
        if filter.as_ref().is_some_and(|f| f != recipient) {
            continue;
        }
        let redeemable = director.redeemable_balance_of(recipient)?;
        println!(
            "  {:<16} {}",
            world.label(recipient)?.yellow(),
            redeemable.to_string().cyan().bold()
        );
    }
    Ok(())
}

fn cmd_verify(path: &str) -> anyhow::Result<()> {
    let world = World::load(path)?;
    let report = LedgerAuditor::audit(world.director.ledger());
    if report.is_valid() {
        println!(
            "{} Ledger consistent: {} records, {} donors, {} recipients",
            "✓".green().bold(),
            report.record_count.to_string().bold(),
            report.donor_count,
            report.recipient_count
        );
        Ok(())
    } else {
        for violation in &report.violations {
            println!("{} {}", "✗".red().bold(), violation);
        }
        bail!("{} violation(s) found", report.violations.len());
    }
}
