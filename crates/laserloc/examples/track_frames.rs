use laserloc::{JsonFileStore, TrackerConfig, TrackingSession, TrackingState};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <homography.json> <frame.png>...", args[0]);
        std::process::exit(2);
    }

    let store = JsonFileStore::new(&args[1]);
    let mut session = TrackingSession::from_store(TrackerConfig::default(), &store)?;

    for path in &args[2..] {
        let frame = image::open(path)?.to_rgb8();
        if session.handle_frame(&frame) == TrackingState::Stable {
            break;
        }
    }

    match (session.state(), session.target_location()) {
        (TrackingState::Stable, Some(p)) => {
            println!("Target stable at {} after {} frames.", p, session.frames_seen())
        }
        (_, Some(p)) => println!("Not stable yet; current estimate {}.", p),
        (_, None) => println!("Target not found in {} frames.", session.frames_seen()),
    }
    Ok(())
}
