//! Identification and CPE negotiation over real sockets.

use classic_client::{ClassicClient, ClientOptions, ClientState};
use classic_server::session::{REASON_DUPLICATE_NAME, REASON_NOT_WHITELISTED, REASON_SERVER_FULL};
use classic_shared::protocol::extensions::{CUSTOM_BLOCKS, ENV_WEATHER_TYPE};
use classic_shared::protocol::packets::SELF_ID;
use classic_shared::protocol::ClientboundPacket;
use classic_shared::world::{Block, BlockPos};
use classic_tests::{init_tracing, test_config, TestServer, WAIT};

fn is_self_spawn(p: &ClientboundPacket) -> bool {
    matches!(p, ClientboundPacket::SpawnPlayer { player_id, .. } if *player_id == SELF_ID)
}

/// Connects and returns the reason of the `Disconnect` the server answers with.
async fn rejection(server: &TestServer, name: &str) -> anyhow::Result<String> {
    let mut client = ClassicClient::connect(&server.addr_string(), ClientOptions::new(name)).await?;
    client
        .wait_for(WAIT, |p| matches!(p, ClientboundPacket::Disconnect { .. }))
        .await?;
    assert_eq!(client.state(), ClientState::Disconnected);
    Ok(client.disconnect_reason().unwrap_or_default().to_string())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vanilla_client_receives_level_and_spawn() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config("vanilla")).await?;

    let mut client = server.join(ClientOptions::new("Alice")).await?;
    let info = client.server().cloned().expect("identified");
    assert_eq!(info.name, "Test Server");
    assert_eq!(info.motd, "integration");
    assert!(!info.operator);
    assert!(!client.server_extensions().has_declared());

    let level = client.level().expect("level");
    assert_eq!((level.width(), level.depth(), level.height()), (32, 16, 32));
    assert_eq!(level.get(BlockPos::new(5, 7, 5)), Block::GRASS);
    assert_eq!(level.get(BlockPos::new(5, 0, 5)), Block::BEDROCK);
    assert_eq!(level.get(BlockPos::new(5, 8, 5)), Block::AIR);

    client.wait_for(WAIT, is_self_spawn).await?;
    assert!(client.self_position().is_some());
    // Vanilla peers never get CPE-only frames.
    assert_eq!(client.weather(), None);
    assert_eq!(client.support_level(), None);

    let server = server.stop().await?;
    assert_eq!(server.players().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cpe_client_negotiates_extensions() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config("cpe")).await?;

    let mut client = server.join(ClientOptions::new("Carol").with_cpe()).await?;
    assert!(client.server_extensions().is_complete());
    assert!(client.server_extensions().supports(CUSTOM_BLOCKS));
    assert!(client.server_extensions().supports(ENV_WEATHER_TYPE));
    assert_eq!(client.support_level(), Some(1));

    client.wait_for(WAIT, is_self_spawn).await?;
    assert_eq!(client.weather(), Some(0));

    server.console("weather snow").await?;
    client
        .wait_for(WAIT, |p| {
            matches!(p, ClientboundPacket::EnvSetWeatherType { weather: 2 })
        })
        .await?;
    assert_eq!(client.weather(), Some(2));

    server.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_name_is_rejected_case_insensitively() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config("dup")).await?;

    let _first = server.join(ClientOptions::new("Dave")).await?;
    assert_eq!(rejection(&server, "dave").await?, REASON_DUPLICATE_NAME);

    let server = server.stop().await?;
    assert_eq!(server.players().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn whitelist_and_capacity_are_enforced() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = test_config("gate");
    cfg.whitelist_enabled = true;
    cfg.whitelist = vec!["Erin".to_string(), "Frank".to_string()];
    cfg.max_players = 1;
    let server = TestServer::start(cfg).await?;

    assert_eq!(rejection(&server, "Mallory").await?, REASON_NOT_WHITELISTED);
    let _erin = server.join(ClientOptions::new("Erin")).await?;
    assert_eq!(rejection(&server, "Frank").await?, REASON_SERVER_FULL);

    server.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operators_are_flagged_in_identification() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = test_config("op");
    cfg.operators = vec!["Olivia".to_string()];
    let server = TestServer::start(cfg).await?;

    let client = server.join(ClientOptions::new("olivia")).await?;
    assert!(client.server().map_or(false, |s| s.operator));

    server.stop().await?;
    Ok(())
}
