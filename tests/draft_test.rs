use anyhow::Result;
use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use chrono::{Duration, Utc};
use std::collections::HashMap;

use gym_app_lib::combobox;
use gym_app_lib::cookies::{read_cookie, CookieSigner, TokenError, MAX_TOKEN_LEN};
use gym_app_lib::{AppError, DraftBuffer, DraftEntry, DraftIntent, Exercise, ExerciseIntent, Unit};

fn sample_exercise(id: i64, name: &str) -> Exercise {
    Exercise {
        id,
        user_id: 1,
        name: name.to_string(),
        load: Some(42.5),
        unit: Some(Unit::Kg),
        repetitions: Some(8),
        created_at: Utc::now(),
    }
}

fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ---- Draft buffer ----

#[test]
fn test_draft_round_trip_after_edits() -> Result<()> {
    let draft = DraftBuffer::default()
        .append(sample_exercise(1, "Squat"))
        .append(sample_exercise(2, "Bench Press"))
        .append(sample_exercise(1, "Squat"));
    let second_key = draft.entries()[1].key.clone();
    let draft = draft.remove(&second_key);

    let restored = DraftBuffer::deserialize(&draft.serialize()?)?;
    assert_eq!(restored, draft);
    assert_eq!(restored.len(), 2);

    let empty = DraftBuffer::default();
    assert_eq!(DraftBuffer::deserialize(&empty.serialize()?)?, empty);
    Ok(())
}

// Deterministic xorshift so failures are reproducible
fn next_random(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

#[test]
fn test_draft_round_trip_keeps_every_field_exact() -> Result<()> {
    let names = [
        "Barbell Back Squat",
        "Farmer's \"walk\"",
        "Développé couché",
        "深蹲 🏋️",
        "back\\slash",
        "",
    ];
    let mut loads = vec![
        Some(385.66829194149443),
        Some(0.1 + 0.2),
        Some(f64::MAX),
        Some(f64::MIN_POSITIVE),
        Some(1e-300),
        Some(-0.0),
        None,
    ];
    let mut state = 0x9E37_79B9_7F4A_7C15;
    for _ in 0..5000 {
        let bits = next_random(&mut state) >> 11;
        loads.push(Some(bits as f64 / (1u64 << 53) as f64 * 500.0));
    }

    let mut draft = DraftBuffer::default();
    for (i, load) in loads.iter().enumerate() {
        let mut exercise = sample_exercise(i as i64, names[i % names.len()]);
        exercise.load = *load;
        exercise.unit = if i % 3 == 0 { None } else { Some(Unit::Lb) };
        exercise.repetitions = match i % 4 {
            0 => None,
            1 => Some(i64::MAX),
            2 => Some(i64::MIN),
            _ => Some(i as i64),
        };
        draft = draft.append(exercise);
    }

    let restored = DraftBuffer::deserialize(&draft.serialize()?)?;
    for (before, after) in draft.entries().iter().zip(restored.entries()) {
        assert_eq!(
            before.exercise.load.map(f64::to_bits),
            after.exercise.load.map(f64::to_bits),
            "load of {} changed",
            before.key
        );
    }
    assert_eq!(restored, draft);
    Ok(())
}

#[test]
fn test_draft_append_preserves_order_and_unique_keys() {
    let mut draft = DraftBuffer::default();
    for (i, name) in ["Squat", "Squat", "Row"].iter().enumerate() {
        let before = draft.len();
        draft = draft.append(sample_exercise(i as i64 % 2, name));
        assert_eq!(draft.len(), before + 1);
    }

    let names: Vec<&str> = draft.entries().iter().map(|e| e.exercise.name.as_str()).collect();
    assert_eq!(names, vec!["Squat", "Squat", "Row"]);

    let keys: std::collections::HashSet<&str> =
        draft.entries().iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys.len(), 3);
    assert_eq!(draft.distinct_exercise_ids(), vec![0, 1]);
}

#[test]
fn test_draft_remove_is_idempotent() {
    let draft = DraftBuffer::default()
        .append(sample_exercise(1, "Squat"))
        .append(sample_exercise(2, "Row"));
    let key = draft.entries()[0].key.clone();

    let once = draft.clone().remove(&key);
    let twice = once.clone().remove(&key);
    assert_eq!(once, twice);
    assert_eq!(once.len(), 1);
    assert_eq!(once.entries()[0].exercise.name, "Row");

    assert_eq!(draft.clone().remove("no-such-key"), draft);
}

#[test]
fn test_draft_append_entry_ignores_duplicate_key() {
    let entry = DraftEntry {
        key: "fixed".to_string(),
        exercise: sample_exercise(1, "Squat"),
    };
    let draft = DraftBuffer::default()
        .append_entry(entry.clone())
        .append_entry(entry);
    assert_eq!(draft.len(), 1);
    assert!(draft.contains_key("fixed"));
}

#[test]
fn test_draft_load_degrades_to_empty() -> Result<()> {
    assert!(DraftBuffer::load(None).is_empty());
    assert!(DraftBuffer::load(Some("")).is_empty());
    assert!(DraftBuffer::load(Some("{not json")).is_empty());
    assert!(DraftBuffer::load(Some(r#"{"exercises": 3}"#)).is_empty());
    assert!(DraftBuffer::load(Some(r#"{"version": 2, "exercises": []}"#)).is_empty());

    let draft = DraftBuffer::default().append(sample_exercise(7, "Dip"));
    assert_eq!(DraftBuffer::load(Some(&draft.serialize()?)), draft);
    Ok(())
}

#[test]
fn test_draft_clear() {
    let draft = DraftBuffer::default().append(sample_exercise(1, "Squat"));
    assert!(draft.clear().is_empty());
}

// ---- Combobox ----

#[test]
fn test_combobox_ignores_case_and_whitespace() {
    let names = vec!["Bench Press".to_string(), "Squat".to_string()];

    let matched: Vec<&String> = combobox::filter(&names, "bench");
    assert_eq!(matched, vec![&names[0]]);

    let matched = combobox::filter(&names, "benchpress");
    assert_eq!(matched, vec![&names[0]]);

    let matched = combobox::filter(&names, " SQ ua ");
    assert_eq!(matched, vec![&names[1]]);

    assert_eq!(combobox::filter(&names, "   ").len(), 2);
    assert!(combobox::filter(&names, "deadlift").is_empty());
    assert!(combobox::matches("Leg  Press", "legpr"));
}

#[test]
fn test_combobox_filters_exercises() {
    let exercises = vec![sample_exercise(1, "Incline Bench"), sample_exercise(2, "Row")];
    let matched = combobox::filter(&exercises, "inclineb");
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, 1);
}

// ---- Intents ----

#[test]
fn test_draft_intent_parsing() -> Result<()> {
    assert_eq!(
        DraftIntent::from_form(&form(&[("_action", "remove"), ("key", "abc")]))?,
        DraftIntent::Remove { key: "abc".to_string() }
    );
    assert_eq!(
        DraftIntent::from_form(&form(&[("_action", "create"), ("title", " Leg Day ")]))?,
        DraftIntent::Commit { title: "Leg Day".to_string() }
    );
    assert_eq!(
        DraftIntent::from_form(&form(&[("_action", "cancel")]))?,
        DraftIntent::Cancel
    );

    let err = DraftIntent::from_form(&form(&[("_action", "remove")])).unwrap_err();
    assert_eq!(err.field(), Some("key"));

    let err = DraftIntent::from_form(&form(&[("_action", "explode")])).unwrap_err();
    assert_eq!(err.field(), Some("_action"));

    let err = DraftIntent::from_form(&form(&[])).unwrap_err();
    assert_eq!(err.field(), Some("_action"));
    Ok(())
}

#[test]
fn test_exercise_intent_parsing() -> Result<()> {
    let intent = ExerciseIntent::from_form(&form(&[
        ("_action", "add"),
        ("exercise[id]", "12"),
        ("workout", "Leg Day"),
    ]))?;
    assert_eq!(
        intent,
        ExerciseIntent::Add {
            workout: "Leg Day".to_string(),
            exercise_id: 12
        }
    );
    assert_eq!(intent.workout_title(), "Leg Day");

    let intent = ExerciseIntent::from_form(&form(&[
        ("_action", "create"),
        ("exerciseName", "Squat"),
        ("load", ""),
        ("unity", "kg"),
        ("repetitions", "10"),
    ]))?;
    let ExerciseIntent::Create { workout, fields } = intent else {
        panic!("expected a create intent");
    };
    assert_eq!(workout, "");
    assert_eq!(fields.name, "Squat");
    assert_eq!(fields.load, None);
    assert_eq!(fields.unit, Some(Unit::Kg));
    assert_eq!(fields.repetitions, Some(10));

    let err = ExerciseIntent::from_form(&form(&[("_action", "add")])).unwrap_err();
    assert_eq!(err.field(), Some("exercise"));

    let err =
        ExerciseIntent::from_form(&form(&[("_action", "add"), ("exerciseId", "x")])).unwrap_err();
    assert_eq!(err.field(), Some("exercise"));

    let err = ExerciseIntent::from_form(&form(&[("_action", "create"), ("exerciseName", "")]))
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { field: "exerciseName", .. }));
    Ok(())
}

// ---- Signed cookies ----

#[test]
fn test_signed_token_round_trip() -> Result<()> {
    let signer = CookieSigner::new(b"0123456789abcdef0123456789abcdef")?;
    let now = Utc::now();
    let token = signer.sign("payload with spaces", now + Duration::hours(1))?;

    assert!(token.starts_with("v1."));
    assert_eq!(signer.verify(&token, now)?, "payload with spaces");
    Ok(())
}

#[test]
fn test_signed_token_rejections() -> Result<()> {
    let signer = CookieSigner::new(b"0123456789abcdef0123456789abcdef")?;
    let other = CookieSigner::new(b"another secret entirely, 32 byte")?;
    let now = Utc::now();
    let token = signer.sign("42", now + Duration::hours(1))?;

    assert_eq!(other.verify(&token, now), Err(TokenError::InvalidSignature));

    let forged = signer.sign("43", now + Duration::hours(1))?;
    let mut parts: Vec<&str> = token.split('.').collect();
    let forged_payload = forged.split('.').nth(1).unwrap_or_default();
    parts[1] = forged_payload;
    assert_eq!(
        signer.verify(&parts.join("."), now),
        Err(TokenError::InvalidSignature)
    );

    assert!(matches!(
        signer.verify(&token, now + Duration::hours(2)),
        Err(TokenError::Expired(_))
    ));
    assert_eq!(signer.verify("garbage", now), Err(TokenError::InvalidFormat));
    assert_eq!(
        signer.verify(&token.replacen("v1", "v9", 1), now),
        Err(TokenError::UnsupportedVersion("v9".to_string()))
    );
    Ok(())
}

#[test]
fn test_signed_token_size_is_capped() -> Result<()> {
    let signer = CookieSigner::new(b"0123456789abcdef0123456789abcdef")?;
    let now = Utc::now();

    let token = signer.sign(&"x".repeat(2000), now + Duration::hours(1))?;
    assert!(token.len() <= MAX_TOKEN_LEN);
    assert_eq!(signer.verify(&token, now)?.len(), 2000);

    assert!(matches!(
        signer.sign(&"x".repeat(MAX_TOKEN_LEN), now + Duration::hours(1)),
        Err(TokenError::TooLarge(len)) if len > MAX_TOKEN_LEN
    ));

    // Anything sign refuses, verify would have rejected too
    let mut draft = DraftBuffer::default();
    loop {
        draft = draft.append(sample_exercise(1, "Barbell Back Squat"));
        match signer.sign(&draft.serialize()?, now + Duration::hours(1)) {
            Ok(token) => {
                let value = signer.verify(&token, now)?;
                assert_eq!(DraftBuffer::load(Some(&value)), draft);
            }
            Err(TokenError::TooLarge(_)) => break,
            Err(e) => return Err(e.into()),
        }
    }
    assert!(draft.len() > 1);
    Ok(())
}

#[test]
fn test_read_cookie_from_headers() {
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_static("theme=dark; exercises=v1.abc.def"));
    headers.append(COOKIE, HeaderValue::from_static("__session=v1.x.y"));

    assert_eq!(read_cookie(&headers, "exercises").as_deref(), Some("v1.abc.def"));
    assert_eq!(read_cookie(&headers, "__session").as_deref(), Some("v1.x.y"));
    assert_eq!(read_cookie(&headers, "missing"), None);
}
