//! Résumé document model, as stored by the editor (camelCase JSON).

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resume {
    pub header: Header,
    pub contact: Contact,
    pub profile: String,
    pub skills: Vec<String>,
    pub languages: Vec<Language>,
    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certifications: Option<Vec<Certification>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awards: Option<Vec<Award>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volunteer: Option<Vec<Volunteer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publications: Option<Vec<Publication>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<Vec<PortfolioLink>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_sections: Option<Vec<CustomSection>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Header {
    pub full_name: String,
    pub job_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    pub phone: String,
    pub email: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proficiency {
    #[default]
    Basic,
    Intermediate,
    Fluent,
    Native,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Language {
    pub id: String,
    pub name: String,
    pub proficiency: Proficiency,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Experience {
    pub id: String,
    pub company: String,
    pub position: String,
    pub start_date: String,
    pub end_date: String,
    pub current: bool,
    pub description: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Education {
    pub id: String,
    pub degree: String,
    pub institution: String,
    pub start_year: String,
    pub end_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reference {
    pub name: String,
    pub role: String,
    pub company: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub technologies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Certification {
    pub id: String,
    pub name: String,
    pub issuer: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Award {
    pub id: String,
    pub title: String,
    pub issuer: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Volunteer {
    pub id: String,
    pub organization: String,
    pub role: String,
    pub start_date: String,
    pub end_date: String,
    pub current: bool,
    pub description: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Publication {
    pub id: String,
    pub title: String,
    pub publisher: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortfolioLink {
    pub id: String,
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomSection {
    pub id: String,
    pub title: String,
    pub items: Vec<String>,
}

impl Resume {
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Sample résumé used for template previews.
    pub fn sample() -> Self {
        Self {
            header: Header {
                full_name: "Alex Johnson".into(),
                job_title: "Senior Software Engineer".into(),
                photo_url: None,
            },
            contact: Contact {
                phone: "+1 (555) 123-4567".into(),
                email: "alex.johnson@email.com".into(),
                address: "San Francisco, CA".into(),
                website: Some("github.com/alexj".into()),
            },
            profile: "Passionate software engineer with 8+ years of experience building \
                      scalable web applications. Specialized in full-stack development with a \
                      focus on React, Node.js, and cloud technologies."
                .into(),
            skills: ["React", "TypeScript", "Node.js", "Python", "AWS", "Docker", "PostgreSQL", "GraphQL"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            languages: vec![
                Language {
                    id: "1".into(),
                    name: "English".into(),
                    proficiency: Proficiency::Native,
                },
                Language {
                    id: "2".into(),
                    name: "Spanish".into(),
                    proficiency: Proficiency::Intermediate,
                },
            ],
            experience: vec![
                Experience {
                    id: "1".into(),
                    company: "TechCorp Inc.".into(),
                    position: "Senior Software Engineer".into(),
                    start_date: "Jan 2021".into(),
                    end_date: "Present".into(),
                    current: true,
                    description: vec![
                        "Led development of core platform features".into(),
                        "Mentored team of 5 junior developers".into(),
                    ],
                },
                Experience {
                    id: "2".into(),
                    company: "StartupXYZ".into(),
                    position: "Full Stack Developer".into(),
                    start_date: "Mar 2018".into(),
                    end_date: "Dec 2020".into(),
                    current: false,
                    description: vec![
                        "Built customer-facing web applications".into(),
                        "Implemented CI/CD pipelines".into(),
                    ],
                },
            ],
            education: vec![Education {
                id: "1".into(),
                degree: "B.S. Computer Science".into(),
                institution: "Stanford University".into(),
                start_year: "2014".into(),
                end_year: "2018".into(),
                gpa: None,
            }],
            ..Self::default()
        }
    }
}
