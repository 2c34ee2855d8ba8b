//! Block changes, chat and departures as seen by connected clients.

use classic_client::ClientOptions;
use classic_shared::protocol::ClientboundPacket;
use classic_shared::world::{Block, BlockPos};
use classic_tests::{init_tracing, test_config, TestServer, WAIT};

fn set_block_at(pos: BlockPos, block: Block) -> impl FnMut(&ClientboundPacket) -> bool {
    move |p| {
        matches!(p, ClientboundPacket::SetBlock { x, y, z, block: b }
            if i32::from(*x) == pos.x && i32::from(*y) == pos.y && i32::from(*z) == pos.z && *b == block.id())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn block_changes_reach_every_player() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config("broadcast")).await?;
    let mut alice = server.join(ClientOptions::new("Alice")).await?;
    let mut bob = server.join(ClientOptions::new("Bob")).await?;

    let pos = BlockPos::new(3, 8, 3);
    alice.set_block(pos, Block::BRICK).await?;
    bob.wait_for(WAIT, set_block_at(pos, Block::BRICK)).await?;
    alice.wait_for(WAIT, set_block_at(pos, Block::BRICK)).await?;
    assert_eq!(bob.level().map(|l| l.get(pos)), Some(Block::BRICK));

    bob.set_block(pos, Block::AIR).await?;
    alice.wait_for(WAIT, set_block_at(pos, Block::AIR)).await?;

    let server = server.stop().await?;
    assert_eq!(server.level().grid().get(pos), Block::AIR);
    assert!(server.level().is_dirty());
    assert_eq!(server.stats().count(Block::BRICK), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stacked_slabs_merge_below() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config("slab")).await?;
    let mut client = server.join(ClientOptions::new("Slabber")).await?;

    let lower = BlockPos::new(4, 8, 4);
    let upper = lower.above();
    client.set_block(lower, Block::SLAB).await?;
    client.wait_for(WAIT, set_block_at(lower, Block::SLAB)).await?;

    client.set_block(upper, Block::SLAB).await?;
    // The placer is told the upper cell is still air before the merge lands.
    client.wait_for(WAIT, set_block_at(upper, Block::AIR)).await?;
    client.wait_for(WAIT, set_block_at(lower, Block::DOUBLE_SLAB)).await?;

    let server = server.stop().await?;
    assert_eq!(server.level().grid().get(lower), Block::DOUBLE_SLAB);
    assert_eq!(server.level().grid().get(upper), Block::AIR);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn custom_blocks_fall_back_for_vanilla_peers() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config("fallback")).await?;
    let mut modern = server.join(ClientOptions::new("Modern").with_cpe()).await?;
    let mut vanilla = server.join(ClientOptions::new("Vanilla")).await?;

    let pos = BlockPos::new(6, 8, 6);
    modern.set_block(pos, Block::COBBLESTONE_SLAB).await?;
    modern
        .wait_for(WAIT, set_block_at(pos, Block::COBBLESTONE_SLAB))
        .await?;
    vanilla.wait_for(WAIT, set_block_at(pos, Block::SLAB)).await?;

    // A vanilla peer may not place what it never negotiated.
    let denied = BlockPos::new(7, 8, 7);
    vanilla.set_block(denied, Block::COBBLESTONE_SLAB).await?;
    vanilla.wait_for(WAIT, set_block_at(denied, Block::AIR)).await?;

    let server = server.stop().await?;
    assert_eq!(server.level().grid().get(pos), Block::COBBLESTONE_SLAB);
    assert_eq!(server.level().grid().get(denied), Block::AIR);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bedrock_is_reserved_for_operators() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = test_config("bedrock");
    cfg.operators = vec!["Admin".to_string()];
    let server = TestServer::start(cfg).await?;
    let mut player = server.join(ClientOptions::new("Player")).await?;
    let mut admin = server.join(ClientOptions::new("Admin")).await?;

    let floor = BlockPos::new(2, 0, 2);
    player.set_block(floor, Block::AIR).await?;
    player.wait_for(WAIT, set_block_at(floor, Block::BEDROCK)).await?;

    admin.set_block(floor, Block::AIR).await?;
    player.wait_for(WAIT, set_block_at(floor, Block::AIR)).await?;

    let server = server.stop().await?;
    assert_eq!(server.level().grid().get(floor), Block::AIR);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chat_and_departure_are_announced() -> anyhow::Result<()> {
    init_tracing();
    let server = TestServer::start(test_config("chat")).await?;
    let mut alice = server.join(ClientOptions::new("Alice")).await?;
    let mut bob = server.join(ClientOptions::new("Bob")).await?;

    alice
        .wait_for(WAIT, |p| {
            matches!(p, ClientboundPacket::Message { message, .. } if message == "Bob joined the game")
        })
        .await?;
    assert!(alice.players().values().any(|name| name == "Bob"));

    bob.chat("hello there").await?;
    alice
        .wait_for(WAIT, |p| {
            matches!(p, ClientboundPacket::Message { message, .. } if message == "<Bob> hello there")
        })
        .await?;

    drop(bob);
    alice
        .wait_for(WAIT, |p| {
            matches!(p, ClientboundPacket::Message { message, .. } if message.starts_with("Bob has disconnected."))
        })
        .await?;
    assert!(alice.players().values().all(|name| name != "Bob"));

    let server = server.stop().await?;
    assert_eq!(server.players().len(), 1);
    assert!(server.players().find_by_name("bob").is_none());
    Ok(())
}
