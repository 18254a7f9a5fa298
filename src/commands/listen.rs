//! `timeshot listen`: print the samples of one marker stream

use crate::marker::MarkerInlet;
use anyhow::Context;
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    /// Marker stream address, e.g. 127.0.0.1:16571
    pub address: String,

    /// Exit after this many samples
    #[arg(long, short = 'n')]
    pub count: Option<u64>,
}

pub async fn listen(args: ListenArgs) -> anyhow::Result<()> {
    let mut inlet = MarkerInlet::connect(args.address.as_str())
        .await
        .with_context(|| format!("cannot connect to marker stream at {}", args.address))?;

    let info = inlet.info();
    println!(
        "Connected to '{}' ({}, {} channel, {:?}) from {}",
        info.name, info.content_type, info.channel_count, info.channel_format, info.hostname
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut received: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            sample = inlet.next_sample() => match sample? {
                Some(sample) => {
                    println!("{}\t{:.6}", sample.value, sample.timestamp);
                    received += 1;
                    if args.count.is_some_and(|limit| received >= limit) {
                        break;
                    }
                }
                None => {
                    println!("Stream closed");
                    break;
                }
            },
        }
    }

    tracing::info!("Received {} markers", received);
    Ok(())
}
