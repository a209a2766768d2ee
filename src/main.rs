use clap::Parser;
use sessioncore::cli::{
    Args, Command, build_config, handle_revoke_all, init_logging, open_database,
};
use sessioncore::error::now_secs;
use tracing::error;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };
    let config = build_config(&args);

    let result = match args.command.clone() {
        Command::Cleanup => {
            let report =
                sessioncore::cleanup::run_cleanup(&db, config.session_retention, None, None).await;
            print_json(&report)
        }
        Command::Sessions { user } => match now_secs() {
            Ok(now) => match db.sessions().list_active_for_user(&user, now).await {
                Ok(sessions) => print_json(&sessions),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        },
        Command::RevokeAll { user, except } => {
            match handle_revoke_all(&db, &user, except.as_deref()).await {
                Ok(count) => {
                    println!("Revoked {} session(s) for {}", count, user);
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            }
        }
        Command::Events { user, limit } => {
            match db.security_events().list_by_user(&user, limit).await {
                Ok(events) => print_json(&events),
                Err(e) => Err(e.to_string()),
            }
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}
