use async_trait::async_trait;
use log::*;
use postgrest::Postgrest;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{ranking::Candidate, BookmeetError, GenericError};

/// A row of the `profiles` table. Only the columns the bot reads are mapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub address: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_no: Option<String>,
}

impl Profile {
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            "N/A".to_string()
        } else {
            name
        }
    }

    pub(crate) fn usable_address(&self) -> Option<&str> {
        self.address.as_deref().filter(|a| !a.trim().is_empty())
    }
}

/// Turns profile rows into ranking candidates, dropping rows without an address.
pub fn candidates_from_profiles(profiles: Vec<Profile>) -> Vec<Candidate> {
    profiles
        .iter()
        .filter_map(|p| {
            p.usable_address()
                .map(|address| Candidate::new(address, p.id.clone()))
        })
        .collect()
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn candidates(&self) -> Result<Vec<Candidate>, GenericError>;
    async fn address_of(&self, user_id: &str) -> Result<Option<String>, GenericError>;
    async fn profile_by_address(&self, address: &str) -> Result<Profile, GenericError>;
    async fn save_address(&self, user_id: &str, address: &str) -> Result<(), GenericError>;
    async fn clear_address(&self, user_id: &str) -> Result<(), GenericError>;
}

pub struct SupabaseService {
    client: Postgrest,
    supabase_token: String,
}

const PROFILES: &str = "profiles";

impl SupabaseService {
    pub fn new(endpoint: &str, supabase_token: &str) -> Self {
        let client = Postgrest::new(endpoint).insert_header("apikey", supabase_token);
        SupabaseService {
            client,
            supabase_token: supabase_token.to_string(),
        }
    }

    async fn profiles_where(&self, column: &str, value: &str) -> Result<Vec<Profile>, GenericError> {
        let raw_resp = self
            .client
            .from(PROFILES)
            .auth(&self.supabase_token)
            .eq(column, value)
            .select("*")
            .execute()
            .await?
            .text()
            .await?;
        Ok(serde_json::from_str(&raw_resp)?)
    }
}

#[async_trait]
impl ProfileDirectory for SupabaseService {
    async fn candidates(&self) -> Result<Vec<Candidate>, GenericError> {
        let raw_resp = self
            .client
            .from(PROFILES)
            .auth(&self.supabase_token)
            .not("is", "address", "null")
            .select("*")
            .execute()
            .await?
            .text()
            .await?;
        let profiles: Vec<Profile> = serde_json::from_str(&raw_resp)?;
        let candidates = candidates_from_profiles(profiles);
        trace!("Loaded {} candidate addresses from Supabase.", candidates.len());
        Ok(candidates)
    }

    async fn address_of(&self, user_id: &str) -> Result<Option<String>, GenericError> {
        Ok(self
            .profiles_where("id", user_id)
            .await?
            .into_iter()
            .find_map(|p| p.usable_address().map(str::to_string)))
    }

    async fn profile_by_address(&self, address: &str) -> Result<Profile, GenericError> {
        let profile = self
            .profiles_where("address", address)
            .await?
            .into_iter()
            .next()
            .ok_or(BookmeetError::UserNotFound())?;
        Ok(profile)
    }

    async fn save_address(&self, user_id: &str, address: &str) -> Result<(), GenericError> {
        if self.profiles_where("id", user_id).await?.is_empty() {
            let json = json!({ "id": user_id, "address": address }).to_string();
            self.client
                .from(PROFILES)
                .auth(&self.supabase_token)
                .insert(json)
                .execute()
                .await?;
        } else {
            let json = json!({ "address": address }).to_string();
            self.client
                .from(PROFILES)
                .auth(&self.supabase_token)
                .eq("id", user_id)
                .update(json)
                .execute()
                .await?;
        }

        Ok(())
    }

    async fn clear_address(&self, user_id: &str) -> Result<(), GenericError> {
        let json = json!({ "address": null }).to_string();
        self.client
            .from(PROFILES)
            .auth(&self.supabase_token)
            .eq("id", user_id)
            .update(json)
            .execute()
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_without_address_are_not_candidates() {
        let profiles: Vec<Profile> = serde_json::from_str(
            r#"[
                {"id":"u1","address":"Jalan Sungai Dua, Penang","first_name":"Ying","last_name":"Sheng"},
                {"id":"u2","address":null},
                {"id":"u3","address":"   "},
                {"id":"u4","address":"Bayan Lepas"}
            ]"#,
        )
        .unwrap();
        let candidates = candidates_from_profiles(profiles);
        let owners: Vec<&str> = candidates.iter().map(|c| c.owner_id.as_str()).collect();
        assert_eq!(owners, vec!["u1", "u4"]);
        assert_eq!(candidates[0].address, "Jalan Sungai Dua, Penang");
    }

    #[test]
    fn display_name_joins_present_parts() {
        let mut profile = Profile {
            id: "u1".into(),
            address: None,
            first_name: Some("Ying".into()),
            last_name: None,
            email: None,
            phone_no: None,
        };
        assert_eq!(profile.display_name(), "Ying");
        profile.first_name = None;
        assert_eq!(profile.display_name(), "N/A");
    }
}
