use anyhow::Result;

use basket_core::models::UserId;

use crate::config::Config;

pub(crate) fn cmd_key_create(config: &Config, user: &str, json: bool) -> Result<()> {
    let user = UserId::new(user.trim());
    let key = config.create_api_key(&user)?;
    if json {
        println!("{}", serde_json::json!({ "user": user, "key": key }));
    } else {
        println!("Created API key for {user}: {key}");
        println!("Include in requests: Authorization: Bearer {key}");
        println!("Stored in {}", config.api_keys_path().display());
    }
    Ok(())
}
