//! User profile types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{SkillId, UserId};

/// Role reported for users without any work experience
pub const DEFAULT_ROLE: &str = "AI Professional";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Personal,
    Professional,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileVisibility {
    #[default]
    Public,
    Private,
    Connections,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnlineStatus {
    Online,
    Away,
    #[default]
    Offline,
    Busy,
}

impl OnlineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnlineStatus::Online => "online",
            OnlineStatus::Away => "away",
            OnlineStatus::Offline => "offline",
            OnlineStatus::Busy => "busy",
        }
    }
}

impl std::str::FromStr for OnlineStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(OnlineStatus::Online),
            "away" => Ok(OnlineStatus::Away),
            "offline" => Ok(OnlineStatus::Offline),
            "busy" => Ok(OnlineStatus::Busy),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    /// Proficiency 0..=100
    pub level: u8,
}

impl Skill {
    pub fn level_label(&self) -> &'static str {
        match self.level {
            90.. => "Master",
            70..=89 => "Expert",
            50..=69 => "Advanced",
            30..=49 => "Intermediate",
            _ => "Beginner",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub school: String,
    pub degree: String,
    pub field: String,
    pub start_year: Option<i32>,
    pub is_current: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkExperience {
    pub company: String,
    pub role: String,
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endorsement {
    pub user: UserId,
    pub endorser: UserId,
    pub skill_id: SkillId,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub follower: UserId,
    pub followee: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub blocker: UserId,
    pub blocked: UserId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Registered account with its social profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub avatar: Option<String>,
    pub cover_photo: Option<String>,
    pub personal_story: String,
    pub location: String,
    pub website: String,
    pub phone_number: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: String,
    pub account_type: AccountType,
    pub profile_visibility: ProfileVisibility,
    pub online_status: OnlineStatus,
    pub last_active: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub is_mentor: bool,
    pub interests: BTreeSet<String>,
    pub personality_tags: BTreeSet<String>,
    pub skills: Vec<Skill>,
    pub education: Vec<Education>,
    pub work_experience: Vec<WorkExperience>,
    pub goals: String,
    pub reputation_points: u32,
    pub follower_count: u32,
    pub following_count: u32,
    pub post_count: u32,
    pub endorsement_count: u32,
    pub profile_completion: u8,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn new(id: UserId, new: NewUser, now: DateTime<Utc>) -> Self {
        let mut user = Self {
            id,
            username: new.username.trim().to_string(),
            email: new.email.trim().to_string(),
            first_name: new.first_name,
            last_name: new.last_name,
            bio: new.bio,
            avatar: None,
            cover_photo: None,
            personal_story: String::new(),
            location: new.location,
            website: String::new(),
            phone_number: String::new(),
            date_of_birth: None,
            gender: String::new(),
            account_type: new.account_type,
            profile_visibility: ProfileVisibility::Public,
            online_status: OnlineStatus::Offline,
            last_active: None,
            is_verified: false,
            is_mentor: false,
            interests: BTreeSet::new(),
            personality_tags: BTreeSet::new(),
            skills: Vec::new(),
            education: Vec::new(),
            work_experience: Vec::new(),
            goals: new.goals,
            reputation_points: 0,
            follower_count: 0,
            following_count: 0,
            post_count: 0,
            endorsement_count: 0,
            profile_completion: 0,
            created_at: now,
        };
        user.profile_completion = user.compute_completion();
        user
    }

    /// "first last", or the username when both are blank
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    /// Role from the most recently started job
    pub fn role(&self) -> String {
        self.work_experience
            .iter()
            .filter(|job| !job.role.trim().is_empty())
            .max_by_key(|job| job.start_date)
            .map(|job| job.role.clone())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string())
    }

    fn primary_education(&self) -> Option<&Education> {
        self.education
            .iter()
            .find(|edu| edu.is_current)
            .or_else(|| self.education.iter().max_by_key(|edu| edu.start_year))
    }

    pub fn field_of_study(&self) -> String {
        self.primary_education()
            .map(|edu| edu.field.clone())
            .unwrap_or_default()
    }

    pub fn institution(&self) -> String {
        self.primary_education()
            .map(|edu| edu.school.clone())
            .unwrap_or_default()
    }

    pub fn degree_level(&self) -> String {
        self.primary_education()
            .map(|edu| edu.degree.clone())
            .unwrap_or_default()
    }

    /// Share of the seven optional profile fields that are filled in
    pub fn compute_completion(&self) -> u8 {
        let filled = [
            self.avatar.as_deref().is_some_and(|a| !a.is_empty()),
            !self.bio.trim().is_empty(),
            !self.location.trim().is_empty(),
            !self.website.trim().is_empty(),
            !self.personal_story.trim().is_empty(),
            !self.phone_number.trim().is_empty(),
            self.date_of_birth.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        (filled * 100 / 7) as u8
    }

    pub fn skill(&self, id: SkillId) -> Option<&Skill> {
        self.skills.iter().find(|skill| skill.id == id)
    }
}

/// Registration input
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub location: String,
    pub goals: String,
    pub account_type: AccountType,
}

impl NewUser {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn goals(mut self, goals: impl Into<String>) -> Self {
        self.goals = goals.into();
        self
    }
}

/// Partial profile update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    /// Empty string clears the avatar
    pub avatar: Option<String>,
    pub cover_photo: Option<String>,
    pub personal_story: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub goals: Option<String>,
    pub account_type: Option<AccountType>,
    pub profile_visibility: Option<ProfileVisibility>,
    pub is_mentor: Option<bool>,
    pub education: Option<Vec<Education>>,
    pub work_experience: Option<Vec<WorkExperience>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(UserId(1), NewUser::new("ada", "ada@example.com"), Utc::now())
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        let mut u = user();
        assert_eq!(u.full_name(), "ada");
        u.first_name = "Ada".to_string();
        assert_eq!(u.full_name(), "Ada");
        u.last_name = "Lovelace".to_string();
        assert_eq!(u.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_role_uses_latest_job() {
        let mut u = user();
        assert_eq!(u.role(), DEFAULT_ROLE);

        u.work_experience = vec![
            WorkExperience {
                company: "Old".to_string(),
                role: "Intern".to_string(),
                start_date: NaiveDate::from_ymd_opt(2015, 1, 1),
            },
            WorkExperience {
                company: "New".to_string(),
                role: "Engineer".to_string(),
                start_date: NaiveDate::from_ymd_opt(2021, 6, 1),
            },
        ];
        assert_eq!(u.role(), "Engineer");
    }

    #[test]
    fn test_education_prefers_current_entry() {
        let mut u = user();
        u.education = vec![
            Education {
                school: "MIT".to_string(),
                degree: "PhD".to_string(),
                field: "Physics".to_string(),
                start_year: Some(2020),
                is_current: false,
            },
            Education {
                school: "Open University".to_string(),
                degree: "MSc".to_string(),
                field: "Data Science".to_string(),
                start_year: Some(2018),
                is_current: true,
            },
        ];
        assert_eq!(u.institution(), "Open University");
        assert_eq!(u.field_of_study(), "Data Science");
        assert_eq!(u.degree_level(), "MSc");
    }

    #[test]
    fn test_completion_counts_seven_fields() {
        let mut u = user();
        assert_eq!(u.compute_completion(), 0);
        u.bio = "hello".to_string();
        u.location = "Paris".to_string();
        assert_eq!(u.compute_completion(), 28);
        u.avatar = Some("a.png".to_string());
        u.website = "https://x.dev".to_string();
        u.personal_story = "story".to_string();
        u.phone_number = "123".to_string();
        u.date_of_birth = NaiveDate::from_ymd_opt(1990, 1, 1);
        assert_eq!(u.compute_completion(), 100);
    }

    #[test]
    fn test_skill_labels() {
        let skill = |level| Skill {
            id: SkillId(1),
            name: "rust".to_string(),
            level,
        };
        assert_eq!(skill(95).level_label(), "Master");
        assert_eq!(skill(70).level_label(), "Expert");
        assert_eq!(skill(50).level_label(), "Advanced");
        assert_eq!(skill(30).level_label(), "Intermediate");
        assert_eq!(skill(10).level_label(), "Beginner");
    }
}
