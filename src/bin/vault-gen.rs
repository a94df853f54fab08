//! Vault Generator CLI.
//!
//! Seals one or more BIP-39 recovery phrases into an encrypted account vault.
//!
//! Usage:
//!   cargo run --bin vault-gen -- --passphrase "..." --mnemonic "word1 word2 ..." \
//!       [--mnemonic "..."] [--ledger TestNet] [--name primary] [--output vault.enc] [--rounds 600000]

use std::env;
use std::path::PathBuf;
use std::process;

use dapp_gatekeeper::adapters::vault::DEFAULT_ROUNDS;
use dapp_gatekeeper::adapters::{AccountRecord, EncryptedVault, VaultRecords};
use dapp_gatekeeper::keys::SigningIdentity;
use dapp_gatekeeper::Ledger;
use tracing::{error, info};

const USAGE: &str = "Usage: vault-gen --passphrase \"...\" --mnemonic \"...\" [--mnemonic \"...\"] \
[--ledger TestNet|MainNet] [--name NAME] [--output PATH] [--rounds N]";

struct Args {
    passphrase: String,
    mnemonics: Vec<String>,
    ledger: Ledger,
    name: String,
    output: PathBuf,
    rounds: u32,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut parsed = Args {
        passphrase: String::new(),
        mnemonics: Vec::new(),
        ledger: Ledger::TestNet,
        name: "account".to_string(),
        output: PathBuf::from("vault.enc"),
        rounds: DEFAULT_ROUNDS,
    };

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args
            .get(i + 1)
            .cloned()
            .ok_or_else(|| format!("missing value for {}", flag))?;
        match flag {
            "--passphrase" => parsed.passphrase = value,
            "--mnemonic" => parsed.mnemonics.push(value),
            "--ledger" => parsed.ledger = value.parse().map_err(|e| format!("{}", e))?,
            "--name" => parsed.name = value,
            "--output" => parsed.output = PathBuf::from(value),
            "--rounds" => {
                parsed.rounds = value
                    .parse()
                    .ok()
                    .filter(|r| *r > 0)
                    .ok_or_else(|| format!("invalid round count '{}'", value))?
            }
            other => return Err(format!("unknown flag {}", other)),
        }
        i += 2;
    }

    if parsed.passphrase.is_empty() || parsed.mnemonics.is_empty() {
        return Err("a passphrase and at least one mnemonic are required".into());
    }
    Ok(parsed)
}

fn main() {
    dapp_gatekeeper::init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    // 1. Derive every account so a bad phrase fails before anything is written
    let mut accounts = Vec::with_capacity(args.mnemonics.len());
    for (i, phrase) in args.mnemonics.iter().enumerate() {
        let identity = match SigningIdentity::from_mnemonic(phrase) {
            Ok(identity) => identity,
            Err(e) => {
                error!(index = i, "invalid recovery phrase: {}", e);
                process::exit(1);
            }
        };
        let name = if args.mnemonics.len() == 1 {
            args.name.clone()
        } else {
            format!("{}-{}", args.name, i + 1)
        };
        accounts.push(AccountRecord {
            name,
            address: identity.address().to_string(),
            mnemonic: phrase.clone(),
        });
    }

    // 2. Seal and write
    let mut records = VaultRecords::new();
    records.insert(args.ledger, accounts);

    info!(path = %args.output.display(), rounds = args.rounds, "sealing vault");
    if let Err(e) = EncryptedVault::seal_to_file(&args.output, args.passphrase.as_bytes(), &records, args.rounds) {
        error!("failed to write vault: {}", e);
        process::exit(1);
    }

    println!("Vault saved to {}", args.output.display());
    for account in records.values().flatten() {
        println!("{} ({}): {}", account.name, args.ledger, account.address);
    }
}
