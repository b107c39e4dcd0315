use tracing::{debug, warn};

use crate::env::Env;
use crate::token::{HandlerResult, Kv, TagToken, Token, TokenHandler};

pub const BEHAVIOR_SWITCH_TAG: &str = "behavior-switch";
pub const PAGE_PROP_PREFIX: &str = "mw:PageProp/";

#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviorSwitchHandler;

impl BehaviorSwitchHandler {
    pub fn new() -> Self {
        Self
    }
}

impl TokenHandler for BehaviorSwitchHandler {
    fn on_tag(&self, token: Token, env: &mut Env<'_>) -> HandlerResult {
        let Token::Tag(tag) = &token else {
            return HandlerResult::Token(token);
        };
        if tag.name != BEHAVIOR_SWITCH_TAG {
            return HandlerResult::Token(token);
        }
        let Some(switch) = tag.attribs.first() else {
            warn!(tsr = ?tag.data_attribs.tsr, "behavior switch without a word attribute");
            return HandlerResult::Token(token);
        };

        let name = env.site_config().magic_word_canonical_name(&switch.v);
        env.set_variable(&name, true);
        debug!(word = %switch.v, property = %name, "set page property");

        HandlerResult::Tokens(vec![Token::SelfClosing(TagToken::new(
            "meta",
            vec![Kv::new("property", format!("{PAGE_PROP_PREFIX}{name}"))],
            tag.data_attribs.clone(),
        ))])
    }
}
