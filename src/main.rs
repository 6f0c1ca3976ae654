// Mailshot - screenshots of new mail from tracked senders
// Copyright (C) 2026  Asa V. Schaeffer
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use mailshot::config::{self, Config};
use mailshot::sink::TelegramSink;
use mailshot::{ScanError, ScanOrchestrator};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const USAGE: &str = "Usage: mailshot <scan|check> <config.json>";

fn orchestrator(config: &Config) -> Result<ScanOrchestrator, ScanError> {
    let sink = TelegramSink::new(config::bot_token()?);
    ScanOrchestrator::builder()
        .recipient(config.recipient)
        .options(config.scan_options())
        .sink(Arc::new(sink))
        .build()
}

fn scan(config: &Config) -> Result<(), ScanError> {
    let orchestrator = orchestrator(config)?;
    let cutoff = config.cutoff(chrono::Local::now().naive_local());
    let errors = orchestrator.run(&config.credentials(), &config.tracked_senders, cutoff)?;

    let report = serde_json::to_string_pretty(&errors)
        .map_err(|e| ScanError::Config(e.to_string()))?;
    println!("{report}");
    Ok(())
}

fn check(config: &Config) -> Result<(), ScanError> {
    let orchestrator = orchestrator(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        for mailbox in config.credentials() {
            let reachable = orchestrator.check_mailbox(&mailbox).await;
            println!(
                "{}: {}",
                mailbox.address,
                if reachable { "ok" } else { "unreachable" }
            );
        }
    });
    Ok(())
}

fn main() -> Result<(), ScanError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let [command, path] = args.as_slice() else {
        return Err(ScanError::Config(USAGE.to_string()));
    };
    let config = Config::load(&PathBuf::from(path))?;

    match command.as_str() {
        "scan" => scan(&config),
        "check" => check(&config),
        _ => Err(ScanError::Config(USAGE.to_string())),
    }
}
