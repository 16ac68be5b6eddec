use {anyhow::Result, clap::Subcommand, serde_json::json};

use {
    wxgate_api::{OAuthScope, TemplateMessage, WebhookQuery, WechatClient},
    wxgate_config::WxgateConfig,
};

#[derive(Subcommand)]
pub enum Command {
    /// Print the application access token.
    Token,
    /// Exchange an authorization code for a user token.
    UserToken {
        #[arg(long)]
        code: String,
    },
    /// Refresh a user token.
    RefreshUserToken {
        #[arg(long)]
        openid: String,
        #[arg(long)]
        refresh_token: String,
    },
    /// Print the JS-API ticket.
    Ticket,
    /// Sign a page URL for the JS-SDK.
    Sign {
        #[arg(long)]
        url: String,
    },
    /// Check a webhook signature. Exits non-zero on mismatch.
    Verify {
        #[arg(long)]
        timestamp: String,
        #[arg(long)]
        nonce: String,
        #[arg(long)]
        signature: String,
    },
    /// Print the OAuth authorization URL.
    AuthUrl {
        #[arg(long)]
        redirect: String,
        /// snsapi_base or snsapi_userinfo.
        #[arg(long, default_value = "snsapi_base")]
        scope: OAuthScope,
    },
    /// Send a template message.
    SendTemplate {
        #[arg(long)]
        openid: String,
        #[arg(long)]
        template_id: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value = "")]
        first: String,
        #[arg(long, default_value = "")]
        keyword1: String,
        #[arg(long, default_value = "")]
        keyword2: String,
        #[arg(long, default_value = "")]
        keyword3: String,
        #[arg(long, default_value = "")]
        remark: String,
    },
}

pub async fn run(command: Command, config: WxgateConfig) -> Result<()> {
    let client = WechatClient::from_config(config)?;

    let output = match command {
        Command::Token => json!({ "access_token": client.get_app_token().await? }),
        Command::UserToken { code } => serde_json::to_value(client.get_user_token(&code).await?)?,
        Command::RefreshUserToken {
            openid,
            refresh_token,
        } => serde_json::to_value(client.refresh_user_token(&openid, &refresh_token).await?)?,
        Command::Ticket => json!({ "ticket": client.get_ticket().await? }),
        Command::Sign { url } => serde_json::to_value(client.sign_for_url(&url).await?)?,
        Command::Verify {
            timestamp,
            nonce,
            signature,
        } => {
            let query = WebhookQuery {
                signature,
                timestamp,
                nonce,
                echostr: None,
            };
            if !client.verify_webhook(&query) {
                anyhow::bail!("signature mismatch");
            }
            json!({ "valid": true })
        },
        Command::AuthUrl { redirect, scope } => json!({ "url": client.auth_url(&redirect, scope)? }),
        Command::SendTemplate {
            openid,
            template_id,
            url,
            first,
            keyword1,
            keyword2,
            keyword3,
            remark,
        } => {
            let msg = TemplateMessage {
                openid,
                template_id,
                url,
                first,
                keyword1,
                keyword2,
                keyword3,
                remark,
            };
            json!({ "msgid": client.send_template(&msg).await? })
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
