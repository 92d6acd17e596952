use serde::{de, Deserialize, Deserializer, Serialize};

// ── Auth ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: SessionUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Profile {
    pub fn badges(&self) -> Vec<String> {
        badges_for_role(&self.role)
    }

    pub fn has_role(&self, allowed: &[&str]) -> bool {
        allowed.contains(&self.role.as_str())
    }
}

/// Partial profile edit. Only the fields that are set go over the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl ProfileUpdate {
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    /// Drops fields set to blank strings; a blank value never overwrites a stored one.
    pub fn without_blanks(self) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            username: keep(self.username),
            display_name: keep(self.display_name),
            email: keep(self.email),
            bio: keep(self.bio),
            avatar_url: keep(self.avatar_url),
            role: keep(self.role),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Readers carry no badge; every other role is shown next to the author name.
pub fn badges_for_role(role: &str) -> Vec<String> {
    if role.is_empty() || role == "reader" {
        Vec::new()
    } else {
        vec![role.to_string()]
    }
}

// ── Articles ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleType {
    Standard,
    Debate,
    Storyboard,
    Video,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Draft,
    #[serde(alias = "pending_review")]
    Pending,
    Published,
    Archived,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSettings {
    pub question: String,
    pub yes_position: String,
    pub no_position: String,
    #[serde(default = "default_true")]
    pub voting_enabled: bool,
    #[serde(default)]
    pub voting_ends_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardEpisode {
    pub series_id: String,
    pub episode_number: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub transcript: Option<String>,
}

const ARTICLE_TYPE_TAG: &str = "article_type";

/// Type-specific payload. Exactly one set exists and it always matches the
/// article type. A missing or null `article_type` reads as standard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "article_type", rename_all = "lowercase")]
pub enum ArticleKind {
    Standard,
    Debate(DebateSettings),
    Storyboard(StoryboardEpisode),
    Video(VideoDetails),
}

#[derive(Deserialize)]
#[serde(tag = "article_type", rename_all = "lowercase")]
enum TaggedKind {
    Standard,
    Debate(DebateSettings),
    Storyboard(StoryboardEpisode),
    Video(VideoDetails),
}

impl From<TaggedKind> for ArticleKind {
    fn from(kind: TaggedKind) -> Self {
        match kind {
            TaggedKind::Standard => ArticleKind::Standard,
            TaggedKind::Debate(d) => ArticleKind::Debate(d),
            TaggedKind::Storyboard(s) => ArticleKind::Storyboard(s),
            TaggedKind::Video(v) => ArticleKind::Video(v),
        }
    }
}

impl<'de> Deserialize<'de> for ArticleKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        if fields
            .get(ARTICLE_TYPE_TAG)
            .map_or(true, serde_json::Value::is_null)
        {
            fields.insert(ARTICLE_TYPE_TAG.to_string(), serde_json::Value::from("standard"));
        }
        TaggedKind::deserialize(serde_json::Value::Object(fields))
            .map(ArticleKind::from)
            .map_err(de::Error::custom)
    }
}

impl ArticleKind {
    pub fn article_type(&self) -> ArticleType {
        match self {
            ArticleKind::Standard => ArticleType::Standard,
            ArticleKind::Debate(_) => ArticleType::Debate,
            ArticleKind::Storyboard(_) => ArticleType::Storyboard,
            ArticleKind::Video(_) => ArticleType::Video,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleForm {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: ArticleStatus,
    #[serde(default)]
    pub should_highlight: bool,
    #[serde(default)]
    pub publish_date: Option<String>,
    #[serde(default = "default_true")]
    pub allow_voting: bool,
    #[serde(flatten)]
    pub kind: ArticleKind,
}

impl ArticleForm {
    pub fn new(title: impl Into<String>, kind: ArticleKind) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: String::new(),
            excerpt: None,
            category_id: None,
            image_url: None,
            slug: None,
            status: ArticleStatus::Draft,
            should_highlight: false,
            publish_date: None,
            allow_voting: true,
            kind,
        }
    }

    pub fn article_type(&self) -> ArticleType {
        self.kind.article_type()
    }
}

/// Row shape sent to the article procedures. `featured` is always written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub category_id: Option<String>,
    pub image_url: String,
    pub slug: String,
    pub article_type: ArticleType,
    pub status: ArticleStatus,
    pub featured: bool,
    pub allow_voting: bool,
    pub publish_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_settings: Option<DebateSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub article_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
}

// ── Comments ──

pub const PUBLISHED: &str = "published";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub name: String,
    pub avatar: Option<String>,
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub article_id: String,
    pub content: String,
    pub created_at: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub author: CommentAuthor,
    pub likes: i64,
    pub replies: Vec<Comment>,
}

/// Author fields joined from `profiles` on `user_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: String,
    pub content: String,
    pub created_at: String,
    pub user_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub article_id: Option<String>,
    #[serde(default)]
    pub profiles: Option<ProfileSummary>,
}

impl CommentRow {
    pub fn into_comment(self, article_id: &str) -> Comment {
        let profile = self.profiles.unwrap_or_default();
        let name = profile
            .display_name
            .filter(|n| !n.is_empty())
            .or(profile.username.filter(|n| !n.is_empty()))
            .unwrap_or_else(|| "Anonymous".to_string());

        Comment {
            id: self.id,
            article_id: self.article_id.unwrap_or_else(|| article_id.to_string()),
            content: self.content,
            created_at: self.created_at,
            author_id: self.user_id,
            parent_id: self.parent_id,
            author: CommentAuthor {
                name,
                avatar: profile.avatar_url.filter(|a| !a.is_empty()),
                badges: badges_for_role(profile.role.as_deref().unwrap_or("reader")),
            },
            likes: 0,
            replies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub article_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub status: String,
}

impl NewComment {
    pub fn published(
        article_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            article_id: article_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            parent_id,
            status: PUBLISHED.to_string(),
        }
    }
}

// ── Live feed ──

/// Raw record carried by an insert on the comment store. It lacks the joined
/// author fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentInsertEvent {
    pub id: String,
    pub article_id: String,
    pub user_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    CommentInserted(CommentInsertEvent),
    ReplyInserted(CommentInsertEvent),
}

impl ChangeEvent {
    pub fn from_record(record: CommentInsertEvent) -> Self {
        if record.parent_id.is_some() {
            ChangeEvent::ReplyInserted(record)
        } else {
            ChangeEvent::CommentInserted(record)
        }
    }

    pub fn record(&self) -> &CommentInsertEvent {
        match self {
            ChangeEvent::CommentInserted(r) | ChangeEvent::ReplyInserted(r) => r,
        }
    }
}

fn default_true() -> bool {
    true
}
