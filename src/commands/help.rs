use poise::async_trait;

use crate::context::CommandContext;
use crate::error::CommandError;
use crate::registry::{BotState, Command, CommandSchema};
use crate::reply::{Embed, Reply, ACCENT};

pub struct Help {
    catalog: Vec<CommandSchema>,
}

impl Help {
    pub fn new(mut catalog: Vec<CommandSchema>) -> Self {
        catalog.push(help_schema());
        catalog.sort_by(|a, b| a.name.cmp(&b.name));
        Help { catalog }
    }

    fn render(&self, prefix: &str) -> Reply {
        let mut embed = Embed::new().color(ACCENT).title("Commands");
        for schema in &self.catalog {
            let mut usage = format!("`/{}` or `{} {}`", schema.name, prefix, schema.name);
            if !schema.aliases.is_empty() {
                usage.push_str(&format!(" (also `{}`)", schema.aliases.join("`, `")));
            }
            embed = embed.field(&schema.name, format!("{}\n{}", schema.description, usage), false);
        }
        Reply::embed(embed.footer(format!(
            "Prefix options: {} <command> --option=value, or just type the value",
            prefix
        )))
    }
}

fn help_schema() -> CommandSchema {
    CommandSchema::new("help", "List everything the bot can do").alias("h")
}

#[async_trait]
impl Command for Help {
    fn schema(&self) -> CommandSchema {
        help_schema()
    }

    async fn execute(&self, ctx: &dyn CommandContext, state: &BotState) -> Result<(), CommandError> {
        ctx.reply(self.render(&state.prefix).ephemeral()).await;
        Ok(())
    }
}
