use serde_json::{Value, json};

const HEADER_COLOR: &str = "#000";
const KEYWORD_COLOR: &str = "#173177";

/// A template message with the standard first/keyword1-3/remark layout.
#[derive(Debug, Clone, Default)]
pub struct TemplateMessage {
    pub openid: String,
    pub template_id: String,
    /// Page opened when the user taps the message.
    pub url: Option<String>,
    pub first: String,
    pub keyword1: String,
    pub keyword2: String,
    pub keyword3: String,
    pub remark: String,
}

impl TemplateMessage {
    pub fn body(&self) -> Value {
        let field = |value: &str, color: &str| json!({ "value": value, "color": color });
        let mut body = json!({
            "touser": self.openid,
            "template_id": self.template_id,
            "data": {
                "first": field(&self.first, HEADER_COLOR),
                "keyword1": field(&self.keyword1, KEYWORD_COLOR),
                "keyword2": field(&self.keyword2, KEYWORD_COLOR),
                "keyword3": field(&self.keyword3, KEYWORD_COLOR),
                "remark": field(&self.remark, HEADER_COLOR),
            },
        });
        if let Some(url) = &self.url {
            body["url"] = Value::String(url.clone());
        }
        body
    }
}
