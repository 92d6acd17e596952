//! Local checks run before anything reaches the remote boundary.
//!
//! Required fields are checked for every intent and reported alone when they
//! fail. Content rules only apply to review submissions, since drafts are
//! saved half-written.

use gazette_shared::{ArticleForm, ArticleKind, MappedRow};

use crate::error::{Field, FieldError};
use crate::submission::Intent;

const MAX_TITLE_CHARS: usize = 150;
const MAX_EXCERPT_CHARS: usize = 300;
const MIN_QUESTION_CHARS: usize = 10;
const MIN_POSITION_CHARS: usize = 50;
const SCRIPT_TAG: &str = "<script>";

pub fn validate_form(form: &ArticleForm, intent: Intent) -> Result<(), Vec<FieldError>> {
    let required = required_field_errors(form, intent);
    if !required.is_empty() {
        return Err(required);
    }

    if intent == Intent::Review {
        let errors = content_errors(form);
        if !errors.is_empty() {
            return Err(errors);
        }
    }
    Ok(())
}

/// Last check on the mapped row before it leaves the process.
pub fn validate_row(row: &MappedRow) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    if row.author_id.trim().is_empty() {
        errors.push(FieldError::new(Field::Author, "Author is required"));
    }
    if row.title.trim().is_empty() {
        errors.push(FieldError::new(Field::Title, "Title is required"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn required_field_errors(form: &ArticleForm, intent: Intent) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if form.title.trim().is_empty() {
        errors.push(FieldError::new(Field::Title, "Title is required"));
    }

    if intent == Intent::Review && is_blank(form.category_id.as_deref()) {
        errors.push(FieldError::new(Field::Category, "Category is required"));
    }

    if let ArticleKind::Video(video) = &form.kind {
        if video.video_url.trim().is_empty() {
            errors.push(FieldError::new(
                Field::VideoUrl,
                "Video URL is required for video articles",
            ));
        }
    }

    errors
}

fn content_errors(form: &ArticleForm) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut check = |ok: bool, field: Field, message: &str| {
        if !ok {
            errors.push(FieldError::new(field, message));
        }
    };

    check(
        form.title.chars().count() <= MAX_TITLE_CHARS,
        Field::Title,
        "Title is too long",
    );
    check(no_script(&form.title), Field::Title, "Title cannot contain script tags");

    check(!form.content.trim().is_empty(), Field::Content, "Content is required");
    check(no_script(&form.content), Field::Content, "Content cannot contain script tags");

    if let Some(excerpt) = &form.excerpt {
        check(
            excerpt.chars().count() <= MAX_EXCERPT_CHARS,
            Field::Excerpt,
            "Excerpt is too long",
        );
        check(no_script(excerpt), Field::Excerpt, "Excerpt cannot contain script tags");
    }

    if let Some(url) = form.image_url.as_deref().filter(|u| !u.is_empty()) {
        check(url.starts_with("https://"), Field::ImageUrl, "Image URL must use HTTPS");
    }

    match &form.kind {
        ArticleKind::Standard => {}
        ArticleKind::Video(video) => {
            check(
                video.video_url.starts_with("https://"),
                Field::VideoUrl,
                "Video URL must use HTTPS",
            );
            if let Some(transcript) = &video.transcript {
                check(
                    no_script(transcript),
                    Field::Transcript,
                    "Transcript cannot contain script tags",
                );
            }
        }
        ArticleKind::Debate(debate) => {
            check(
                debate.question.chars().count() >= MIN_QUESTION_CHARS,
                Field::Question,
                "Question must be at least 10 characters long",
            );
            check(no_script(&debate.question), Field::Question, "Question cannot contain script tags");
            check(
                debate.yes_position.chars().count() >= MIN_POSITION_CHARS,
                Field::YesPosition,
                "Yes position argument must be at least 50 characters long",
            );
            check(
                no_script(&debate.yes_position),
                Field::YesPosition,
                "Position argument cannot contain script tags",
            );
            check(
                debate.no_position.chars().count() >= MIN_POSITION_CHARS,
                Field::NoPosition,
                "No position argument must be at least 50 characters long",
            );
            check(
                no_script(&debate.no_position),
                Field::NoPosition,
                "Position argument cannot contain script tags",
            );
        }
        ArticleKind::Storyboard(episode) => {
            check(!episode.series_id.trim().is_empty(), Field::Series, "Series is required");
            check(
                episode.episode_number > 0,
                Field::Episode,
                "Episode number must be positive",
            );
        }
    }

    errors
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn no_script(text: &str) -> bool {
    !text.contains(SCRIPT_TAG)
}
