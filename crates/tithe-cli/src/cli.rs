use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tithe",
    about = "Tithe — yield redirection over a rebasing staked token",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path of the JSON state file.
    #[arg(long, global = true, default_value = "tithe.json")]
    pub state: String,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh state file at index 1.0
    Init(InitArgs),
    /// Mint staked tokens into an account
    Mint(MintArgs),
    /// Advance the rebase index (simulates staking yield)
    Rebase(RebaseArgs),
    /// Donate principal from a donor to a recipient
    Deposit(DepositArgs),
    /// Withdraw donated principal (realizes accrued yield first)
    Withdraw(WithdrawArgs),
    /// Withdraw all of a donor's donations across every recipient
    WithdrawAll(WithdrawAllArgs),
    /// Claim yield owed to a recipient
    Redeem(RedeemArgs),
    /// Show balances, donations, and redeemable yield
    Report(ReportArgs),
    /// Audit ledger aggregates against a full rescan
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing state file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct MintArgs {
    pub account: String,
    pub amount: u128,
}

#[derive(Args)]
pub struct RebaseArgs {
    /// New index as a decimal string, e.g. "1.05".
    pub index: String,
}

#[derive(Args)]
pub struct DepositArgs {
    pub donor: String,
    pub recipient: String,
    pub amount: u128,
}

#[derive(Args)]
pub struct WithdrawArgs {
    pub donor: String,
    pub recipient: String,
    pub amount: u128,
}

#[derive(Args)]
pub struct WithdrawAllArgs {
    pub donor: String,
}

#[derive(Args)]
pub struct RedeemArgs {
    pub recipient: String,
    /// Claim from a single donor instead of all donors.
    #[arg(short, long)]
    pub donor: Option<String>,
}

#[derive(Args)]
pub struct ReportArgs {
    /// Restrict the report to one account.
    pub account: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["tithe", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init(_)));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::try_parse_from(["tithe", "init", "--force"]).unwrap();
        if let Command::Init(args) = cli.command {
            assert!(args.force);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_mint() {
        let cli = Cli::try_parse_from(["tithe", "mint", "alice", "1000"]).unwrap();
        if let Command::Mint(args) = cli.command {
            assert_eq!(args.account, "alice");
            assert_eq!(args.amount, 1000);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_deposit() {
        let cli = Cli::try_parse_from(["tithe", "deposit", "alice", "bob", "400"]).unwrap();
        if let Command::Deposit(args) = cli.command {
            assert_eq!(args.donor, "alice");
            assert_eq!(args.recipient, "bob");
            assert_eq!(args.amount, 400);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_redeem_single_donor() {
        let cli = Cli::try_parse_from(["tithe", "redeem", "bob", "--donor", "alice"]).unwrap();
        if let Command::Redeem(args) = cli.command {
            assert_eq!(args.recipient, "bob");
            assert_eq!(args.donor, Some("alice".into()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_redeem_all_donors() {
        let cli = Cli::try_parse_from(["tithe", "redeem", "bob"]).unwrap();
        if let Command::Redeem(args) = cli.command {
            assert_eq!(args.donor, None);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_rebase() {
        let cli = Cli::try_parse_from(["tithe", "rebase", "1.05"]).unwrap();
        if let Command::Rebase(args) = cli.command {
            assert_eq!(args.index, "1.05");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_state_path() {
        let cli = Cli::try_parse_from(["tithe", "--state", "/tmp/t.json", "report"]).unwrap();
        assert_eq!(cli.state, "/tmp/t.json");
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["tithe", "--verbose", "verify"]).unwrap();
        assert!(cli.verbose);
    }
}
