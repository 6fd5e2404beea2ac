use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// The three publishable content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Article,
    Project,
    Gallery,
}

impl OwnerKind {
    pub const ALL: [OwnerKind; 3] = [OwnerKind::Article, OwnerKind::Project, OwnerKind::Gallery];

    /// Storage tag written to `owner_type` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Article => "article",
            OwnerKind::Project => "project",
            OwnerKind::Gallery => "gallery",
        }
    }

    /// Human-facing label used in notification subjects.
    pub fn label(&self) -> &'static str {
        match self {
            OwnerKind::Article => "Article",
            OwnerKind::Project => "Project",
            OwnerKind::Gallery => "Gallery",
        }
    }
}

impl FromStr for OwnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(OwnerKind::Article),
            "project" => Ok(OwnerKind::Project),
            "gallery" => Ok(OwnerKind::Gallery),
            other => Err(format!("unknown owner type '{}'", other)),
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged reference from the index (and from votes) back to an owner entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: i64,
}

impl OwnerRef {
    pub fn new(kind: OwnerKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn article(id: i64) -> Self {
        Self::new(OwnerKind::Article, id)
    }

    pub fn project(id: i64) -> Self {
        Self::new(OwnerKind::Project, id)
    }

    pub fn gallery(id: i64) -> Self {
        Self::new(OwnerKind::Gallery, id)
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Fields every owner kind carries, mirrored into the post index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OwnerHeader {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: i64,
    pub gallery_id: i64,
    pub position: i64,
    pub footer: String,
    pub image_url: String,
    pub thumb_url: String,
    pub delete_url: String,
}

/// Kind-specific content of an owner entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OwnerBody {
    Article { content: String },
    Project { description: String, link: String },
    Gallery { images: Vec<Image> },
}

impl OwnerBody {
    pub fn kind(&self) -> OwnerKind {
        match self {
            OwnerBody::Article { .. } => OwnerKind::Article,
            OwnerBody::Project { .. } => OwnerKind::Project,
            OwnerBody::Gallery { .. } => OwnerKind::Gallery,
        }
    }
}

/// A fully loaded owner entity (detail view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(flatten)]
    pub header: OwnerHeader,
    pub body: OwnerBody,
}

impl Owner {
    pub fn kind(&self) -> OwnerKind {
        self.body.kind()
    }

    pub fn owner_ref(&self) -> OwnerRef {
        OwnerRef::new(self.kind(), self.header.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
pub struct ProjectFields {
    #[validate(length(max = 10000))]
    pub description: String,
    #[validate(url)]
    pub link: Option<String>,
}

/// Kind-specific input for create/update. Galleries receive their images
/// through the dedicated image operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OwnerContent {
    Article { content: String },
    Project(ProjectFields),
    Gallery,
}

impl OwnerContent {
    pub fn kind(&self) -> OwnerKind {
        match self {
            OwnerContent::Article { .. } => OwnerKind::Article,
            OwnerContent::Project(_) => OwnerKind::Project,
            OwnerContent::Gallery => OwnerKind::Gallery,
        }
    }
}

/// Input for `CreateOwner` and `UpdateOwner`. The publication flag is not part
/// of it: it is set at creation and afterwards only through `publish`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OwnerInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub content: OwnerContent,
}

impl OwnerInput {
    pub fn article(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: OwnerContent::Article {
                content: content.into(),
            },
        }
    }

    pub fn project(
        title: impl Into<String>,
        description: impl Into<String>,
        link: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: OwnerContent::Project(ProjectFields {
                description: description.into(),
                link,
            }),
        }
    }

    pub fn gallery(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: OwnerContent::Gallery,
        }
    }

    pub fn kind(&self) -> OwnerKind {
        self.content.kind()
    }

    /// Validates the title and the kind-specific fields.
    pub fn check(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()?;
        if let OwnerContent::Project(fields) = &self.content {
            fields.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewImage {
    #[validate(url)]
    pub image_url: String,
    #[validate(url)]
    pub thumb_url: Option<String>,
    #[validate(url)]
    pub delete_url: Option<String>,
    #[validate(length(max = 200))]
    pub footer: String,
}
