use console::Term;
use donorbridge::sync::BackfillCanceller;

/// Cancel the backfill on the first Ctrl+C and exit on the second.
///
/// The backfill stops between donations, so everything already delivered is
/// logged before the command returns.
pub(crate) fn cancel_on_ctrl_c(canceller: BackfillCanceller) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing the current donation...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing the current donation");
        }

        canceller.cancel();

        // Wait for second Ctrl+C for force quit
        if tokio::signal::ctrl_c().await.is_ok() {
            if is_tty {
                eprintln!("Force quit!");
            }
            std::process::exit(130);
        }
    });
}
