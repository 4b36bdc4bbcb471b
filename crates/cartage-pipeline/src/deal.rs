//! Provider sharding and storage-deal command rendering.

use cartage_config::PROVIDER_COUNT;
use cartage_toolchain::Commitment;

/// Deal duration in chain epochs, roughly 18 months at 30-second epochs.
pub const DEAL_DURATION_EPOCHS: u32 = 1_555_200;

/// Providers receiving a replica of each container.
pub const REPLICA_COUNT: usize = 4;

/// Pick the four providers for a container from its sequence shard.
///
/// Even shards go to the middle of the roster, odd shards to its edges plus
/// the shared pair, so consecutive containers spread across all six providers
/// while every container keeps exactly four replicas.
#[must_use]
pub fn select_providers(shard: u32, providers: &[String; PROVIDER_COUNT]) -> [&str; REPLICA_COUNT] {
    if shard % 2 == 0 {
        [
            providers[1].as_str(),
            providers[2].as_str(),
            providers[3].as_str(),
            providers[4].as_str(),
        ]
    } else {
        [
            providers[0].as_str(),
            providers[1].as_str(),
            providers[4].as_str(),
            providers[5].as_str(),
        ]
    }
}

/// Render the submission command for one provider replica.
#[must_use]
pub fn render_command(
    provider: &str,
    host: &str,
    container_name: &str,
    commitment: &Commitment,
    payload_cid: &str,
    wallet: &str,
) -> String {
    format!(
        "boost -vv deal --verified=true --provider={provider} \
         --http-url=http://{host}/http/{container_name} \
         --commp={commp} --car-size={car_size} --piece-size={piece_size} \
         --payload-cid={payload_cid} --duration={DEAL_DURATION_EPOCHS} --wallet={wallet}",
        commp = commitment.commp_cid,
        car_size = commitment.container_size,
        piece_size = commitment.piece_size,
    )
}
