mod common;

use std::sync::Arc;

use common::{device, file_core};
use futures::future::join_all;
use sessioncore::db::DeviceInfo;
use sessioncore::device_code::{AuthorizeOutcome, PollOutcome};
use sessioncore::error::now_secs;
use sessioncore::session::RefreshOutcome;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rotation_single_winner() {
    let (core, _dir) = file_core().await;
    let core = Arc::new(core);
    let pair = core
        .sessions
        .create_session("alice", &device("10.0.0.1"))
        .await
        .unwrap();

    let tasks = (0..8).map(|_| {
        let core = core.clone();
        let token = pair.refresh_token.clone();
        tokio::spawn(async move { core.sessions.refresh(&token, &device("10.0.0.1")).await })
    });

    let outcomes: Vec<RefreshOutcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, RefreshOutcome::Success(_)))
        .count();
    let revocations = outcomes
        .iter()
        .filter(|o| matches!(o, RefreshOutcome::SecurityRevocation { .. }))
        .count();
    assert_eq!(winners, 1);
    // The first loser sees reuse and revokes; the rest find nothing live.
    assert_eq!(revocations, 1);

    let now = now_secs().unwrap();
    assert!(
        core.db
            .sessions()
            .list_active_for_user("alice", now)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_device_authorize_single_winner() {
    let (core, _dir) = file_core().await;
    let core = Arc::new(core);
    let code = core.device_flow.create_device_code(DeviceInfo::default());

    let tasks = ["alice", "mallory"].map(|user| {
        let core = core.clone();
        let user_code = code.user_code.clone();
        tokio::spawn(async move {
            core.device_flow
                .authorize_device_code(&user_code, user)
                .await
        })
    });

    let outcomes: Vec<AuthorizeOutcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_authorized()).count(), 1);
    assert!(outcomes.contains(&AuthorizeOutcome::AlreadyAuthorized));

    let PollOutcome::Authorized(tokens) = core.device_flow.poll_device_code(&code.device_code).await
    else {
        panic!("device should receive tokens");
    };
    let winner = core.sessions.authenticate(&tokens.access_token).await.unwrap().sub;
    let loser = if winner == "alice" { "mallory" } else { "alice" };

    // Exactly one live session exists and it belongs to the winner.
    let now = now_secs().unwrap();
    let sessions = core.db.sessions();
    assert_eq!(sessions.list_active_for_user(&winner, now).await.unwrap().len(), 1);
    assert!(sessions.list_active_for_user(loser, now).await.unwrap().is_empty());

    // Second consume finds nothing.
    assert!(core.device_flow.registry().consume(&code.device_code).is_none());
}
