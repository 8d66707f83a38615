use crate::core::config::data::Config;

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(unset)")
}

impl Config {
    /// Human-readable dump of the settings. Passwords are never shown.
    pub fn render_all(&self) -> String {
        let mut out = String::from("Current configuration:\n");
        out.push_str(&format!("  model-url: {}\n", self.effective_model_url()));
        out.push_str(&format!("  model: {}\n", self.effective_model()));
        let persona = self.persona();
        out.push_str(&format!("  persona-name: {}\n", persona.name));
        out.push_str(&format!("  persona-role: {}\n", persona.role));
        out.push_str(&format!(
            "  max-output-chars: {}\n",
            self.effective_max_output_chars()
        ));
        out.push_str(&format!(
            "  stream-output: {}\n",
            if self.effective_stream_output() {
                "on"
            } else {
                "off"
            }
        ));
        out.push_str(&format!(
            "  request-timeout: {}s\n",
            self.request_timeout().as_secs()
        ));
        out.push_str(&format!(
            "  last-server: {}\n",
            or_unset(self.last_server.as_deref())
        ));
        if self.servers.is_empty() {
            out.push_str("  servers: (none saved)\n");
        } else {
            out.push_str("  servers:\n");
            for server in &self.servers {
                let auth = if server.password.is_some() {
                    "password in config"
                } else if server.key_file.is_some() {
                    "key file"
                } else {
                    "keyring"
                };
                out.push_str(&format!(
                    "    {}: {}@{}:{} ({auth})\n",
                    server.name, server.username, server.host, server.port
                ));
            }
        }
        out
    }

    pub fn print_all(&self) {
        print!("{}", self.render_all());
    }
}
