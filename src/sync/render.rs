use super::domain::{Annotation, Reply};

/// Renders annotations and replies into issue and comment text.
///
/// Output depends only on the input and the instance settings, so re-running
/// a sync overwrites the remote resource with identical content.
#[derive(Debug, Clone)]
pub struct Renderer {
    instance_name: String,
    instance_home: String,
}

struct BodyParts<'a> {
    source_name: &'a str,
    source_home: &'a str,
    respective_content: Option<&'a str>,
    author: &'a str,
    body: &'a str,
    original: &'a str,
}

impl Renderer {
    pub fn new(instance_name: impl Into<String>, instance_home: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            instance_home: instance_home.into(),
        }
    }

    pub fn issue_title(&self, annotation: &Annotation) -> String {
        format!(
            "{} [via {}@{}]",
            annotation.title, annotation.source_name, self.instance_name
        )
    }

    pub fn issue_body(&self, annotation: &Annotation) -> String {
        self.body(BodyParts {
            source_name: &annotation.source_name,
            source_home: &annotation.source_home,
            respective_content: annotation
                .respective_content
                .as_deref()
                .filter(|content| !content.is_empty()),
            author: &annotation.author,
            body: &annotation.body,
            original: &annotation.original,
        })
    }

    pub fn comment_body(&self, reply: &Reply) -> String {
        self.body(BodyParts {
            source_name: &reply.source_name,
            source_home: &reply.source_home,
            respective_content: None,
            author: &reply.author,
            body: &reply.body,
            original: &reply.original,
        })
    }

    fn body(&self, parts: BodyParts<'_>) -> String {
        let mut out = format!(
            "_Annotation imported from <a href =\"{}\">{}</a>._\n\n",
            parts.source_home, parts.source_name
        );
        if let Some(content) = parts.respective_content {
            out.push_str("Regarding this part:\n<blockquote>");
            out.push_str(content);
            out.push_str("</blockquote>\n\n");
        }
        out.push_str(&format!(
            "{} wrote:\n<blockquote>\n{}\n</blockquote>\n\n",
            parts.author, parts.body
        ));
        out.push_str(&format!(
            "_Link to <a href = \"{}\">orginial comment</a>. About <a href =\"{}\">docLoop</a>._",
            parts.original, self.instance_home
        ));
        out
    }
}
