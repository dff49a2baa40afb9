use chrono::{Duration, Utc};
use uuid::Uuid;

use trailhead_api::auth::{
    digest_reset_token, generate_reset_token, hash_password, sign_token, verify_password,
    verify_token,
};
use trailhead_api::middleware::auth::role_allowed;
use trailhead_api::models::user::{Role, User};

fn user_with_password_change(changed_at: Option<chrono::DateTime<Utc>>) -> User {
    User {
        id: Uuid::new_v4(),
        name: "Ada Trail".to_string(),
        email: "ada@example.com".to_string(),
        photo: None,
        role: "user".to_string(),
        active: true,
        created_at: Utc::now(),
        password: String::new(),
        password_changed_at: changed_at,
        password_reset_token: None,
        password_reset_expires: None,
    }
}

#[test]
fn issued_tokens_verify_and_carry_the_user() {
    let user_id = Uuid::new_v4();
    let token = sign_token(user_id).expect("sign");
    let claims = verify_token(&token).expect("verify");

    assert_eq!(claims.sub, user_id);
    assert!(claims.iat <= Utc::now().timestamp());
    assert!(claims.exp > claims.iat);
}

#[test]
fn tokens_issued_before_a_password_change_are_invalidated() {
    let token = sign_token(Uuid::new_v4()).expect("sign");
    let claims = verify_token(&token).expect("verify");

    // Password changed after issuance: token must be treated as stale.
    let user = user_with_password_change(Some(Utc::now() + Duration::hours(1)));
    assert!(user.changed_password_after(claims.iat));

    // Password changed before issuance: token stays valid.
    let user = user_with_password_change(Some(Utc::now() - Duration::hours(1)));
    assert!(!user.changed_password_after(claims.iat));
}

#[test]
fn password_change_skew_tolerates_same_instant_issuance() {
    // The stored change timestamp carries a 1s negative skew; a token issued
    // in the same second as the change must remain valid.
    let now = Utc::now();
    let stamped = now - Duration::seconds(trailhead_api::auth::PASSWORD_CHANGE_SKEW_SECS);
    let user = user_with_password_change(Some(stamped));
    assert!(!user.changed_password_after(now.timestamp()));
}

#[test]
fn password_hashing_round_trip() {
    let hash = hash_password("hiking-boots-42").expect("hash");
    assert!(hash.starts_with("$2"));
    assert!(verify_password("hiking-boots-42", &hash));
    assert!(!verify_password("hiking-boots-43", &hash));
}

#[test]
fn reset_tokens_store_only_a_digest() {
    let token = generate_reset_token();

    // What the email carries and what the database stores differ.
    assert_ne!(token.plaintext, token.digest);
    // Lookup works by digesting the presented plaintext.
    assert_eq!(digest_reset_token(&token.plaintext), token.digest);
    // A different token's digest never matches, so a cleared or replaced
    // digest makes the old plaintext useless.
    assert_ne!(digest_reset_token(&generate_reset_token().plaintext), token.digest);
}

#[test]
fn role_guard_matrix() {
    let booking_managers = [Role::LeadGuide, Role::Admin];

    assert!(role_allowed(Some(Role::Admin), &booking_managers));
    assert!(role_allowed(Some(Role::LeadGuide), &booking_managers));
    assert!(!role_allowed(Some(Role::Guide), &booking_managers));
    assert!(!role_allowed(Some(Role::User), &booking_managers));
    assert!(!role_allowed(None, &booking_managers));
}

#[test]
fn stored_roles_parse_back_into_the_ladder() {
    for (raw, role) in [
        ("user", Role::User),
        ("guide", Role::Guide),
        ("lead-guide", Role::LeadGuide),
        ("admin", Role::Admin),
    ] {
        let mut user = user_with_password_change(None);
        user.role = raw.to_string();
        assert_eq!(user.role(), Some(role));
    }

    let mut user = user_with_password_change(None);
    user.role = "root".to_string();
    assert_eq!(user.role(), None);
}
