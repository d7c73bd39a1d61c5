//! Source snippets that reproduce a prepared request outside the console.
//!
//! Every renderer embeds the method, URL, headers and body of the
//! [`PreparedRequest`] verbatim, so a copied snippet sends the same bytes
//! as `try`.

use anyhow::{Result, anyhow};
use std::fmt;
use std::str::FromStr;

use crate::builder::PreparedRequest;
use crate::catalog::HttpMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    JavaScript,
    TypeScript,
    Python,
    Curl,
    Go,
    Ruby,
}

type Renderer = fn(&PreparedRequest) -> String;

impl Language {
    pub const ALL: [Language; 6] = [
        Self::JavaScript,
        Self::TypeScript,
        Self::Python,
        Self::Curl,
        Self::Go,
        Self::Ruby,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Curl => "curl",
            Self::Go => "go",
            Self::Ruby => "ruby",
        }
    }

    fn renderer(self) -> Renderer {
        match self {
            Self::JavaScript => render_javascript,
            Self::TypeScript => render_typescript,
            Self::Python => render_python,
            Self::Curl => render_curl,
            Self::Go => render_go,
            Self::Ruby => render_ruby,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Self::JavaScript),
            "typescript" | "ts" => Ok(Self::TypeScript),
            "python" | "py" => Ok(Self::Python),
            "curl" => Ok(Self::Curl),
            "go" | "golang" => Ok(Self::Go),
            "ruby" | "rb" => Ok(Self::Ruby),
            other => Err(anyhow!(
                "unknown language {other} (expected: javascript|typescript|python|curl|go|ruby)"
            )),
        }
    }
}

pub fn generate(request: &PreparedRequest, language: Language) -> String {
    (language.renderer())(request)
}

/// Double-quoted literal valid in JS, TS, Python and Go.
fn quoted(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

/// Every `#` is escaped so `#{}`, `#@` and `#$` never interpolate.
fn ruby_quoted(value: &str) -> String {
    quoted(value).replace('#', "\\#")
}

fn shell_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn render_fetch_options(request: &PreparedRequest) -> String {
    let mut code = String::new();
    code.push_str(&format!("  method: {},\n", quoted(request.method.as_str())));
    code.push_str("  headers: {\n");
    let headers: Vec<String> = request
        .headers
        .iter()
        .map(|(k, v)| format!("    {}: {}", quoted(k), quoted(v)))
        .collect();
    code.push_str(&headers.join(",\n"));
    code.push_str("\n  },\n");
    if let Some(body) = &request.body {
        code.push_str(&format!("  body: {},\n", quoted(body)));
    }
    code
}

fn render_javascript(request: &PreparedRequest) -> String {
    let mut code = String::from("// Using fetch API\n");
    code.push_str(&format!("fetch({}, {{\n", quoted(&request.url)));
    code.push_str(&render_fetch_options(request));
    code.push_str("})\n");
    code.push_str("  .then((response) => response.json())\n");
    code.push_str("  .then((data) => console.log(data))\n");
    code.push_str("  .catch((error) => console.error(\"Error:\", error));\n");
    code
}

fn render_typescript(request: &PreparedRequest) -> String {
    let mut code = String::from("// Using fetch API\n");
    code.push_str("async function main(): Promise<void> {\n");
    code.push_str(&format!(
        "  const response: Response = await fetch({}, {{\n",
        quoted(&request.url)
    ));
    for line in render_fetch_options(request).lines() {
        code.push_str(&format!("  {line}\n"));
    }
    code.push_str("  });\n");
    code.push_str("  const data: unknown = await response.json();\n");
    code.push_str("  console.log(data);\n");
    code.push_str("}\n\n");
    code.push_str("main().catch((error) => console.error(\"Error:\", error));\n");
    code
}

fn render_python(request: &PreparedRequest) -> String {
    let mut code = String::from("# Using requests library\nimport requests\n\n");
    code.push_str(&format!("url = {}\n", quoted(&request.url)));
    code.push_str("headers = {\n");
    for (k, v) in &request.headers {
        code.push_str(&format!("    {}: {},\n", quoted(k), quoted(v)));
    }
    code.push_str("}\n");

    let method = quoted(request.method.as_str());
    if let Some(body) = &request.body {
        code.push_str(&format!("payload = {}\n\n", quoted(body)));
        code.push_str(&format!(
            "response = requests.request({method}, url, headers=headers, data=payload)\n"
        ));
    } else {
        code.push_str(&format!(
            "\nresponse = requests.request({method}, url, headers=headers)\n"
        ));
    }
    code.push_str("print(response.json())\n");
    code
}

fn render_curl(request: &PreparedRequest) -> String {
    let mut parts = vec![format!(
        "curl -X {} {}",
        request.method,
        shell_quoted(&request.url)
    )];
    for (k, v) in &request.headers {
        parts.push(format!("-H {}", shell_quoted(&format!("{k}: {v}"))));
    }
    if let Some(body) = &request.body {
        parts.push(format!("-d {}", shell_quoted(body)));
    }
    let mut code = parts.join(" \\\n  ");
    code.push('\n');
    code
}

fn render_go(request: &PreparedRequest) -> String {
    let mut code = String::from("// Using net/http package\npackage main\n\nimport (\n");
    code.push_str("\t\"fmt\"\n\t\"io\"\n\t\"net/http\"\n");
    if request.body.is_some() {
        code.push_str("\t\"strings\"\n");
    }
    code.push_str(")\n\nfunc main() {\n");

    let method = quoted(request.method.as_str());
    let url = quoted(&request.url);
    match &request.body {
        Some(body) => {
            code.push_str(&format!("\tpayload := strings.NewReader({})\n", quoted(body)));
            code.push_str(&format!(
                "\treq, err := http.NewRequest({method}, {url}, payload)\n"
            ));
        }
        None => {
            code.push_str(&format!("\treq, err := http.NewRequest({method}, {url}, nil)\n"));
        }
    }
    code.push_str("\tif err != nil {\n\t\tpanic(err)\n\t}\n\n");
    for (k, v) in &request.headers {
        code.push_str(&format!("\treq.Header.Set({}, {})\n", quoted(k), quoted(v)));
    }
    code.push_str("\n\tresp, err := http.DefaultClient.Do(req)\n");
    code.push_str("\tif err != nil {\n\t\tpanic(err)\n\t}\n");
    code.push_str("\tdefer resp.Body.Close()\n\n");
    code.push_str("\tbody, err := io.ReadAll(resp.Body)\n");
    code.push_str("\tif err != nil {\n\t\tpanic(err)\n\t}\n");
    code.push_str("\tfmt.Println(string(body))\n}\n");
    code
}

fn render_ruby(request: &PreparedRequest) -> String {
    let class = match request.method {
        HttpMethod::Get => "Get",
        HttpMethod::Post => "Post",
        HttpMethod::Put => "Put",
        HttpMethod::Delete => "Delete",
    };
    let mut code = String::from("# Using net/http\nrequire \"net/http\"\nrequire \"uri\"\n\n");
    code.push_str(&format!("uri = URI({})\n", ruby_quoted(&request.url)));
    code.push_str("http = Net::HTTP.new(uri.host, uri.port)\n");
    code.push_str("http.use_ssl = uri.scheme == \"https\"\n\n");
    code.push_str(&format!("request = Net::HTTP::{class}.new(uri)\n"));
    for (k, v) in &request.headers {
        code.push_str(&format!("request[{}] = {}\n", ruby_quoted(k), ruby_quoted(v)));
    }
    if let Some(body) = &request.body {
        code.push_str(&format!("request.body = {}\n", ruby_quoted(body)));
    }
    code.push_str("\nresponse = http.request(request)\nputs response.body\n");
    code
}
