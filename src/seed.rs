//! Deterministic sample data for demos and local development

use tracing::info;

use crate::community::{CommunityCategory, NewCommunity};
use crate::errors::Result;
use crate::store::Store;
use crate::types::UserId;
use crate::users::{Education, NewUser, ProfileUpdate, WorkExperience};

struct SampleUser {
    username: &'static str,
    first: &'static str,
    last: &'static str,
    location: &'static str,
    interests: &'static [&'static str],
    tags: &'static [&'static str],
    skills: &'static [(&'static str, u8)],
    school: &'static str,
    field: &'static str,
    company: &'static str,
    role: &'static str,
}

const SAMPLE_USERS: &[SampleUser] = &[
    SampleUser {
        username: "ada",
        first: "Ada",
        last: "Lovelace",
        location: "London",
        interests: &["mathematics", "programming", "music"],
        tags: &["Analytical", "Innovator"],
        skills: &[("Rust", 4), ("Algorithms", 5)],
        school: "University of London",
        field: "Mathematics",
        company: "Analytical Engines",
        role: "Research Engineer",
    },
    SampleUser {
        username: "grace",
        first: "Grace",
        last: "Hopper",
        location: "New York",
        interests: &["programming", "compilers", "teaching"],
        tags: &["Leader", "Communicator"],
        skills: &[("COBOL", 5), ("Compilers", 5)],
        school: "Yale University",
        field: "Mathematics",
        company: "Navy Labs",
        role: "Engineering Manager",
    },
    SampleUser {
        username: "alan",
        first: "Alan",
        last: "Turing",
        location: "London",
        interests: &["mathematics", "ai", "running"],
        tags: &["Problem Solver", "Analytical"],
        skills: &[("Cryptography", 5), ("Python", 3)],
        school: "University of Cambridge",
        field: "Mathematics",
        company: "Bletchley Research",
        role: "Cryptanalyst",
    },
    SampleUser {
        username: "frida",
        first: "Frida",
        last: "Kahlo",
        location: "Mexico City",
        interests: &["digital art", "photography", "travel"],
        tags: &["Creative", "Communicator"],
        skills: &[("Illustration", 5), ("Photography", 4)],
        school: "National Preparatory School",
        field: "Fine Arts",
        company: "Studio Azul",
        role: "Art Director",
    },
    SampleUser {
        username: "nikola",
        first: "Nikola",
        last: "Tesla",
        location: "New York",
        interests: &["hardware", "physics", "ai"],
        tags: &["Innovator", "Creative"],
        skills: &[("Electronics", 5), ("C", 3)],
        school: "Graz University of Technology",
        field: "Electrical Engineering",
        company: "Wardenclyffe Labs",
        role: "Hardware Engineer",
    },
    SampleUser {
        username: "marie",
        first: "Marie",
        last: "Curie",
        location: "Paris",
        interests: &["physics", "chemistry", "teaching"],
        tags: &["Team Player", "Organizer"],
        skills: &[("Data Analysis", 4), ("Python", 4)],
        school: "University of Paris",
        field: "Physics",
        company: "Radium Institute",
        role: "Lab Director",
    },
];

struct SampleCommunity {
    name: &'static str,
    description: &'static str,
    category: CommunityCategory,
    topics: &'static [&'static str],
}

const SAMPLE_COMMUNITIES: &[SampleCommunity] = &[
    SampleCommunity {
        name: "Tech Enthusiasts",
        description: "A community for technology lovers to discuss the latest trends and innovations.",
        category: CommunityCategory::Tech,
        topics: &["Programming", "AI", "Hardware", "Software", "Web Development"],
    },
    SampleCommunity {
        name: "Art & Creativity",
        description: "Share your artwork and get inspired by other artists.",
        category: CommunityCategory::Art,
        topics: &["Digital Art", "Traditional Art", "Design", "Photography", "Animation"],
    },
];

/// Pairs of usernames connected by the seed
const SAMPLE_CONNECTIONS: &[(&str, &str)] = &[("ada", "grace"), ("ada", "alan"), ("marie", "nikola")];

/// Counts of what a seeding run created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub communities: usize,
    pub connections: usize,
}

fn seed_user(store: &mut Store, sample: &SampleUser) -> Result<UserId> {
    let id = store.register_user(
        NewUser::new(sample.username, format!("{}@superlink.example", sample.username))
            .name(sample.first, sample.last)
            .location(sample.location),
    )?;
    store.update_profile(
        id,
        ProfileUpdate {
            bio: Some(format!("{} {} from {}", sample.first, sample.last, sample.location)),
            education: Some(vec![Education {
                school: sample.school.to_string(),
                degree: "Bachelor".to_string(),
                field: sample.field.to_string(),
                start_year: None,
                is_current: false,
            }]),
            work_experience: Some(vec![WorkExperience {
                company: sample.company.to_string(),
                role: sample.role.to_string(),
                start_date: None,
            }]),
            ..Default::default()
        },
    )?;
    for interest in sample.interests {
        store.add_interest(id, interest)?;
    }
    for tag in sample.tags {
        store.add_personality_tag(id, tag)?;
    }
    for (skill, level) in sample.skills {
        store.add_skill(id, skill, *level)?;
    }
    Ok(id)
}

/// Create sample users, communities and connections
///
/// Existing usernames and community slugs are left alone, so running the
/// seed twice creates nothing the second time.
pub fn seed_sample_data(store: &mut Store) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for sample in SAMPLE_USERS {
        if store.find_by_username(sample.username).is_none() {
            seed_user(store, sample)?;
            report.users += 1;
        }
    }

    let members: Vec<UserId> = SAMPLE_USERS
        .iter()
        .filter_map(|s| store.find_by_username(s.username).map(|u| u.id))
        .collect();
    let Some((&owner, others)) = members.split_first() else {
        return Ok(report);
    };

    for sample in SAMPLE_COMMUNITIES {
        let slug = crate::community::slugify(sample.name);
        if store.community_by_slug(&slug).is_ok() {
            continue;
        }
        let community = store.create_community(
            owner,
            NewCommunity {
                name: sample.name.to_string(),
                description: sample.description.to_string(),
                category: sample.category,
                topics: sample.topics.iter().map(|t| t.to_string()).collect(),
                rules: vec!["Be respectful".to_string(), "Stay on topic".to_string()],
                is_private: false,
            },
        )?;
        for &member in others {
            store.join_community(member, community, "")?;
        }
        report.communities += 1;
    }

    for (a, b) in SAMPLE_CONNECTIONS {
        let (Some(a), Some(b)) = (
            store.find_by_username(a).map(|u| u.id),
            store.find_by_username(b).map(|u| u.id),
        ) else {
            continue;
        };
        if store.connection_between(a, b).is_some() {
            continue;
        }
        let request = store.send_connection_request(a, b, "Let's connect!")?;
        store.accept_connection_request(b, request)?;
        report.connections += 1;
    }

    info!(
        users = report.users,
        communities = report.communities,
        connections = report.connections,
        "sample data seeded"
    );
    Ok(report)
}
