//! Console front end for the client: an interactive prompt and a canned
//! sample run.

use crate::client::Client;
use crate::config::ClientConfig;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::error;

/// Commands sent by the sample run.
pub const SAMPLE_COMMANDS: [&str; 4] = [
    "RTRV-NE:TID001::001;",
    "ED-OC48:TID001:AID001:002::STATUS=ACTIVE;",
    "ENT-T1:TID001:AID002:003::RATE=1544;",
    "ACT-SVC:TID001:AID003:004;",
];

const HELP: &str = "
Sample TL1 Commands:
-------------------
RTRV-NE:TID001::001;
  - Retrieve network element information
ED-OC48:TID001:AID001:002::STATUS=ACTIVE;
  - Edit OC-48 configuration
ENT-T1:TID001:AID002:003::RATE=1544;
  - Enter new T1 circuit
DLT-T1:TID001:AID002:004;
  - Delete T1 circuit
ACT-SVC:TID001:AID003:005;
  - Activate service
CANC-OP:TID001::006;
  - Cancel operation

Command Format: VERB-NOUN:TID:AID:CTAG:MODIFIER1:MODIFIER2:PARAMETERS;
";

const PROMPT: &str = "\nTL1> ";

/// Connect and run either the sample sequence or the interactive prompt.
pub async fn run(config: &ClientConfig) -> io::Result<()> {
    let mut client = Client::connect(config.connect.as_str()).await?;
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("Server: {}\n", client.banner()).as_bytes())
        .await?;

    let result = if config.samples {
        run_samples(&mut client, config.sample_delay, &mut stdout).await
    } else {
        let stdin = BufReader::new(tokio::io::stdin());
        run_interactive(&mut client, stdin, &mut stdout).await
    };

    if let Err(e) = &result {
        error!(error = %e, "Error communicating with server");
    }
    client.disconnect().await?;
    result
}

/// Send each of [`SAMPLE_COMMANDS`], pausing `delay` after every response.
pub async fn run_samples<W>(client: &mut Client, delay: Duration, out: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for command in SAMPLE_COMMANDS {
        out.write_all(format!("\nSending: {}\n", command).as_bytes())
            .await?;
        let response = client.request(command).await?;
        out.write_all(format!("Response:{}", response).as_bytes())
            .await?;
        out.flush().await?;
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

/// Read commands from `input` until `quit` or end of input.
pub async fn run_interactive<R, W>(client: &mut Client, mut input: R, out: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    out.write_all(
        b"\nTL1 Client Interactive Session Started\n\
          Type 'help' for sample commands, 'quit' to exit\n\
          ==========================================\n",
    )
    .await?;

    let mut line = String::new();
    loop {
        out.write_all(PROMPT.as_bytes()).await?;
        out.flush().await?;

        line.clear();
        if input.read_line(&mut line).await? == 0 {
            break;
        }

        let command = line.trim();
        if command.eq_ignore_ascii_case("quit") {
            break;
        } else if command.eq_ignore_ascii_case("help") {
            out.write_all(HELP.as_bytes()).await?;
        } else if !command.is_empty() {
            let response = client.request(command).await?;
            out.write_all(format!("Response:{}", response).as_bytes())
                .await?;
        }
    }

    out.flush().await
}
