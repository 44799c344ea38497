//! Quick-start example for adgen.
//!
//! Run with:
//!   API_KEY=AIza... cargo run --example quickstart -- product.png
//!
//! Generates a square ad image, then animates the given product photo into a
//! portrait video ad.

use std::sync::Arc;
use std::time::Duration;

use adgen::{
    AspectRatio, CancellationToken, Client, EnvCredential, GenerationRequest, PollOptions,
    ReferenceImage, Studio,
};

#[tokio::main]
async fn main() -> adgen::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Build a client reading API_KEY from the environment on every request
    // -----------------------------------------------------------------------
    let client = Client::builder()
        .credentials(Arc::new(EnvCredential::default()))
        .build()?;

    let studio = Studio::builder()
        .client(client)
        .on_key_invalid(|| eprintln!("The API key was rejected. Select a valid key and retry."))
        .on_status(|msg| println!("  {msg}"))
        .build()?;

    studio.ensure_credential().await?;

    // -----------------------------------------------------------------------
    // 2. Generate an image
    // -----------------------------------------------------------------------
    let request = GenerationRequest::image(
        "A professional, photorealistic shot of a cappuccino frappe with whipped cream \
         and chocolate drizzle, in the style of a high-end cafe advertisement.",
    );
    match studio.run_outcome(&request, &PollOptions::default()).await {
        Ok(image) => {
            image.save(image.suggested_filename()).await?;
            println!("Saved {}", image.suggested_filename());
        }
        Err(outcome) => eprintln!("Image failed: {outcome}"),
    }

    // -----------------------------------------------------------------------
    // 3. Animate a product photo, cancelling after 15 minutes
    // -----------------------------------------------------------------------
    let Some(path) = std::env::args().nth(1) else {
        println!("Pass a product image path to also generate a video.");
        return Ok(());
    };
    let frame = ReferenceImage::from_path(&path).await?;
    let request = GenerationRequest::video(
        "Generate a professional video ad for this cappuccino frappe. Show dynamic shots \
         of the drink, with coffee beans and ice splashing in slow motion.",
        frame,
    )
    .with_aspect_ratio(AspectRatio::Portrait);

    let cancel = CancellationToken::new();
    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15 * 60)).await;
        timer.cancel();
    });

    let opts = PollOptions::default()
        .with_cancel(cancel)
        .on_poll(|job| println!("  job {} done={}", job.name, job.done));

    match studio.run_outcome(&request, &opts).await {
        Ok(video) => {
            video.save(video.suggested_filename()).await?;
            println!(
                "Saved {} ({} bytes, {:.0}s)",
                video.suggested_filename(),
                video.data.len(),
                video.elapsed.as_secs_f64()
            );
        }
        Err(outcome) => eprintln!("Video failed: {outcome}"),
    }

    Ok(())
}
