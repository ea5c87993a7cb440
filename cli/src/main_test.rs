use super::*;

fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(std::iter::once("storefront").chain(args.iter().copied())).unwrap().command
}

#[test]
fn strength_does_not_open_a_session() {
    assert!(matches!(parse(&["strength", "Secret12"]), Command::Strength { password } if password == "Secret12"));
}

#[test]
fn session_commands_parse_at_top_level() {
    assert!(matches!(parse(&["whoami"]), Command::Session(SessionCommand::Whoami)));
    assert!(matches!(parse(&["logout"]), Command::Session(SessionCommand::Logout)));
    assert!(matches!(
        parse(&["login", "--email", "a@b.com", "--password", "secret"]),
        Command::Session(SessionCommand::Login(LoginArgs { email, .. })) if email == "a@b.com"
    ));
}

#[tokio::test]
async fn state_logger_exits_when_manager_is_dropped() {
    let session_path = std::env::temp_dir().join(format!("storefront-cli-logger-{}.json", std::process::id()));
    let manager = SessionManager::from_config(&SessionConfig {
        api_base_url: "http://127.0.0.1:9".into(),
        session_path: session_path.clone(),
        timeouts: storefront_session::config::HttpTimeouts::default(),
    })
    .unwrap();
    let watcher = spawn_state_logger(&manager);

    manager.logout();
    drop(manager);

    tokio::time::timeout(std::time::Duration::from_secs(5), watcher).await.unwrap().unwrap();
    let _ = std::fs::remove_file(session_path);
}
