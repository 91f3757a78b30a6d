//! Validator pipeline benchmark: clamp, merge, score, decide over a
//! synthetic hour-long episode.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use podscrub::detect::{AdMarker, DetectionStage};
use podscrub::transcribe::TranscriptSegment;
use podscrub::validate::AdValidator;

fn synthetic_segments(duration: f64) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    let mut t = 0.0;
    let mut i = 0u32;
    while t < duration {
        let text = if i % 7 == 0 {
            "This episode is brought to you by BetterHelp, betterhelp.com/pod"
        } else {
            "And then we kept talking about the actual topic of the show"
        };
        segments.push(TranscriptSegment {
            start: t,
            end: t + 8.0,
            text: text.to_string(),
        });
        t += 8.0;
        i += 1;
    }
    segments
}

fn synthetic_ads(duration: f64) -> Vec<AdMarker> {
    let mut ads = Vec::new();
    let mut t = 30.0;
    let mut i = 0u32;
    while t + 60.0 < duration {
        let mut ad = AdMarker::new(
            t,
            t + 45.0 + f64::from(i % 3) * 20.0,
            0.55 + f64::from(i % 5) * 0.1,
            if i % 2 == 0 {
                "BetterHelp sponsor read with promo code"
            } else {
                "advertisement"
            },
            DetectionStage::FirstPass,
        );
        if i % 4 == 0 {
            ad.sponsor = Some("BetterHelp".to_string());
        }
        ads.push(ad);
        t += 300.0;
        i += 1;
    }
    ads
}

fn bench_validation(c: &mut Criterion) {
    let duration = 3600.0;
    let segments = synthetic_segments(duration);
    let ads = synthetic_ads(duration);

    c.bench_function("validate_hour_episode", |b| {
        b.iter(|| {
            let validator = AdValidator::new(duration, segments.clone(), None);
            black_box(validator.validate(black_box(ads.clone())))
        })
    });

    c.bench_function("validate_with_description_sponsors", |b| {
        let description = r#"Sponsors: <a href="https://betterhelp.com/pod">BetterHelp</a>
            <a href="https://nordvpn.com/pod">NordVPN</a>"#;
        b.iter(|| {
            let validator = AdValidator::new(duration, segments.clone(), Some(description));
            black_box(validator.validate(black_box(ads.clone())))
        })
    });
}

criterion_group!(benches, bench_validation);
criterion_main!(benches);
