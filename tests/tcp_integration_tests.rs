//! TCP timeout module: validation, verified writes and revert.

mod common;

use std::sync::Arc;

use common::{context, not_found, ok, reg_value, test_config, ScriptedRunner};
use nettune::modules::tcp::{self, ValueState};
use nettune::modules::ModuleId;
use nettune::orchestrator;
use nettune::TuneError;

const TCP_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Services\Tcpip\Parameters";

fn query(name: &str) -> String {
    format!("reg query {} /v {}", TCP_KEY, name)
}

fn dword(name: &str, hex: &str) -> nettune::system::CommandOutput {
    ok(&reg_value(name, "REG_DWORD", hex))
}

#[tokio::test]
async fn test_apply_writes_and_verifies_both_values() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let runner = Arc::new(
        ScriptedRunner::new()
            .on_seq(
                &query("TcpMaxDataRetransmissions"),
                vec![
                    dword("TcpMaxDataRetransmissions", "0x5"),
                    dword("TcpMaxDataRetransmissions", "0xa"),
                ],
            )
            .on_seq(
                &query("KeepAliveTime"),
                vec![not_found(), dword("KeepAliveTime", "0x6ddd00")],
            ),
    );
    let mut config = test_config();
    config.tcp.check_port = port;
    let (ctx, _dir) = context(runner.clone(), config);

    let report = tcp::apply(&ctx).await.unwrap();

    assert!(report.success);
    assert_eq!(report.message, "2/2 TCP values verified");
    assert_eq!(report.steps.len(), 3);
    assert!(report.steps[2].success, "{}", report.steps[2].detail);
    assert!(runner.called(&format!(
        "reg add {} /v TcpMaxDataRetransmissions /t REG_DWORD /d 10 /f",
        TCP_KEY
    )));
    assert!(runner.called(&format!(
        "reg add {} /v KeepAliveTime /t REG_DWORD /d 7200000 /f",
        TCP_KEY
    )));
}

#[tokio::test]
async fn test_failed_connectivity_check_does_not_fail_module() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .on(&query("TcpMaxDataRetransmissions"), dword("TcpMaxDataRetransmissions", "0xa"))
            .on(&query("KeepAliveTime"), dword("KeepAliveTime", "0x6ddd00")),
    );
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = test_config();
    config.tcp.check_port = port;
    let (ctx, _dir) = context(runner, config);

    let report = tcp::apply(&ctx).await.unwrap();

    assert!(report.success);
    assert!(!report.steps.last().unwrap().success);
}

#[tokio::test]
async fn test_out_of_range_value_is_rejected_before_writing() {
    let runner = Arc::new(ScriptedRunner::new());
    let mut config = test_config();
    config.tcp.keep_alive_time = 1_000;
    let (ctx, _dir) = context(runner.clone(), config);

    let err = tcp::apply(&ctx).await.unwrap_err();

    assert!(matches!(err, TuneError::InvalidValue(_)));
    assert!(!runner.called("reg add"));
    assert!(!ctx.backups.exists(ModuleId::Tcp.key()));
}

#[tokio::test]
async fn test_revert_restores_previous_and_removes_new_values() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .on_seq(
                &query("TcpMaxDataRetransmissions"),
                vec![
                    dword("TcpMaxDataRetransmissions", "0x5"),
                    dword("TcpMaxDataRetransmissions", "0xa"),
                    dword("TcpMaxDataRetransmissions", "0x5"),
                ],
            )
            .on_seq(
                &query("KeepAliveTime"),
                vec![not_found(), dword("KeepAliveTime", "0x6ddd00"), not_found()],
            ),
    );
    let (ctx, _dir) = context(runner.clone(), test_config());

    assert!(orchestrator::run_module(&ctx, ModuleId::Tcp).await.success);
    let report = orchestrator::revert_module(&ctx, ModuleId::Tcp).await;

    assert!(report.success, "{}", report.message);
    assert_eq!(report.message, "2/2 TCP values restored");
    assert!(runner.called(&format!(
        "reg add {} /v TcpMaxDataRetransmissions /t REG_DWORD /d 5 /f",
        TCP_KEY
    )));
    assert!(runner.called(&format!("reg delete {} /v KeepAliveTime /f", TCP_KEY)));
}

#[tokio::test]
async fn test_status_classifies_values() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .on(&query("TcpMaxDataRetransmissions"), dword("TcpMaxDataRetransmissions", "0xa"))
            .on(&query("KeepAliveTime"), dword("KeepAliveTime", "0x1b7740")),
    );
    let (ctx, _dir) = context(runner, test_config());

    let status = tcp::status(&ctx).await.unwrap();

    assert_eq!(status[0].state, ValueState::Configured);
    assert_eq!(status[1].state, ValueState::NeedsUpdate(1_800_000));
}
