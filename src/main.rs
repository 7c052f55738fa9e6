//! Demo binary: runs one full mix round against an in-process service.

use std::error::Error;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::info;

use ringvrm::crypto::{RingMember, SecretKey};
use ringvrm::mixer::{MixRequest, PoolStatus, RingMixerService, RingVRMConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let config = RingVRMConfig {
        min_delay_ms: 200,
        max_delay_ms: 1_500,
        ..RingVRMConfig::default()
    };
    let service = RingMixerService::new(config);

    let pool = service
        .create_mix_pool(
            "ETH",
            Decimal::from_str("0.1")?,
            Decimal::from_str("10")?,
            Some(2),
        )
        .await?;
    info!(
        pool_id = %pool.id,
        anonymity_set = pool.anonymity_set.len(),
        "pool created"
    );

    // What a wallet would do client-side: pick decoys, hide the real key
    // among them, sign the spend.
    let secret = SecretKey::generate();
    let generator = service.generator();
    let mut ring = generator.select_decoys(7, "0xdemo-wallet", "ETH")?;
    ring.insert(
        2,
        RingMember {
            address: "0xdemo-wallet".to_string(),
            public_key: secret.public_key(),
            index: 2,
        },
    );
    let signature = generator.generate_ring_signature(b"demo mix", &secret, &ring, 2)?;

    let transaction = service
        .join_mix_pool(
            &pool.id,
            MixRequest {
                input_address: "0xdemo-wallet".to_string(),
                output_addresses: vec!["0xdemo-out-1".to_string(), "0xdemo-out-2".to_string()],
                amount: Decimal::from_str("1.5")?,
                mix_depth: None,
                delay_range_ms: None,
                ring_signature: signature,
            },
        )
        .await?;
    info!(tx_id = %transaction.id, proof = %transaction.mix_proof, "joined pool");

    service.execute_mix(&pool.id).await?;
    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if service.get_pool(&pool.id).await?.status == PoolStatus::Completed {
            break;
        }
    }

    let stats = service.get_system_stats().await;
    info!(
        total_mixed = %stats.total_mixed,
        average_mix_time_ms = stats.average_mix_time_ms,
        success_rate = stats.mix_success_rate,
        "mix round complete"
    );

    service.shutdown().await;
    Ok(())
}
