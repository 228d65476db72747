#![cfg(unix)]

use script_launcher::command::DetachedConsole;
use script_launcher::error::Result as LaunchResult;
use script_launcher::session::{OutputLine, SessionState, StreamKind};
use script_launcher::{
    Catalog, DefaultsUpdate, EnvironmentDescriptor, EnvironmentRegistry, LaunchRequest, Launcher,
    OutputPump, OutputSink, ScriptDescriptor, ScriptKind, ScriptRunner,
};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Default)]
struct Collected {
    lines: Vec<OutputLine>,
    state: Option<SessionState>,
}

impl OutputSink for Collected {
    fn line(&mut self, line: &OutputLine) {
        self.lines.push(line.clone());
    }

    fn finished(&mut self, state: SessionState) {
        self.state = Some(state);
    }
}

fn catalog_with_shell(dir: &Path) -> Catalog {
    let mut catalog = Catalog::load_or_default(dir.join("catalog.yaml")).unwrap();
    catalog.settings.backup_path = dir.join("backups");
    catalog
        .add_environment(EnvironmentDescriptor::new("sh", "/bin/sh"))
        .unwrap();
    catalog
}

fn pump_to_end(
    launcher: &Launcher,
    script: &ScriptDescriptor,
    envs: &EnvironmentRegistry,
    request: &LaunchRequest,
) -> Collected {
    let session = launcher.run(script, envs, request).unwrap();
    let mut pump = OutputPump::with_interval(session, Duration::from_millis(10));
    let mut sink = Collected::default();
    pump.run(&mut sink);
    sink
}

#[test]
fn catalogued_script_runs_and_remembers_its_settings() {
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("greet.py");
    fs::write(&script_path, "echo \"hi $1\"\necho \"args: $#\" >&2\nexit 3\n").unwrap();

    let mut catalog = catalog_with_shell(dir.path());
    let mut script = ScriptDescriptor::new("greet", &script_path, ScriptKind::Interpreted);
    script.env = Some("sh".to_string());
    script.category = "Tools".to_string();
    catalog.add_script(script).unwrap();
    catalog.save().unwrap();

    let script = catalog.find_script("greet", None).unwrap().clone();
    let mut request = LaunchRequest::from_defaults(&script);
    request.arguments = r#""there you""#.to_string();
    request.show_output = true;

    let launcher = Launcher::default();
    let result = pump_to_end(&launcher, &script, catalog.environments(), &request);
    assert_eq!(result.state, Some(SessionState::Finished(Some(3))));
    // Relative order across the two streams is not guaranteed.
    assert_eq!(result.lines.len(), 2);
    assert!(result.lines.contains(&OutputLine {
        stream: StreamKind::Stdout,
        text: "hi there you".to_string(),
    }));
    assert!(result.lines.contains(&OutputLine {
        stream: StreamKind::Stderr,
        text: "args: 1".to_string(),
    }));

    let update = DefaultsUpdate::from_request(&script, &request);
    assert!(catalog.apply_defaults("greet", Some("Tools"), update).unwrap());
    catalog.save().unwrap();

    let reloaded = Catalog::load(dir.path().join("catalog.yaml")).unwrap();
    let stored = reloaded.find_script("greet", Some("Tools")).unwrap();
    assert_eq!(stored.defaults.arguments.as_deref(), Some(r#""there you""#));
    assert_eq!(stored.defaults.show_output, Some(true));
    assert_eq!(stored.defaults.interactive, Some(false));
    assert_eq!(stored.defaults.working_dir, None);
    assert_eq!(fs::read_dir(dir.path().join("backups")).unwrap().count(), 1);

    // The stored defaults now reproduce the same launch.
    let again = LaunchRequest::from_defaults(stored);
    assert_eq!(again.arguments, request.arguments);
    assert!(again.show_output);
}

#[test]
fn custom_kind_plugs_into_the_launcher() {
    struct ShRunner {
        script: ScriptDescriptor,
    }

    impl ScriptRunner for ShRunner {
        fn script(&self) -> &ScriptDescriptor {
            &self.script
        }

        fn prepare_command(&self, request: &LaunchRequest) -> LaunchResult<Vec<String>> {
            let mut argv = vec!["/bin/sh".to_string(), self.script.path.display().to_string()];
            argv.extend(script_launcher::lexer::split_arguments(&request.arguments)?);
            Ok(argv)
        }

        fn detached_console(&self) -> DetachedConsole {
            DetachedConsole::Headless
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.sh");
    fs::write(&path, "echo \"$1-$2\"\n").unwrap();

    let kind = ScriptKind::Other("sh".to_string());
    let mut launcher = Launcher::default();
    launcher.registry_mut().register_runner(
        kind.clone(),
        |script: ScriptDescriptor, _: &EnvironmentRegistry| -> Box<dyn ScriptRunner> {
            Box::new(ShRunner { script })
        },
    );

    let script = ScriptDescriptor::new("job", &path, kind);
    let request = LaunchRequest {
        arguments: "a 'b c'".to_string(),
        show_output: true,
        ..Default::default()
    };
    let result = pump_to_end(&launcher, &script, &EnvironmentRegistry::default(), &request);
    assert_eq!(result.lines.len(), 1);
    assert_eq!(result.lines[0].text, "a-b c");
}

#[test]
fn detached_run_reports_nothing_but_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quiet.py");
    let marker = dir.path().join("ran");
    fs::write(&path, format!("echo noise\ntouch '{}'\n", marker.display())).unwrap();

    let mut script = ScriptDescriptor::new("quiet", &path, ScriptKind::Interpreted);
    script.env = Some("sh".to_string());
    let envs = EnvironmentRegistry::new(vec![EnvironmentDescriptor::new("sh", "/bin/sh")]);

    let mut session = Launcher::default()
        .run(&script, &envs, &LaunchRequest::default())
        .unwrap();
    assert!(!session.is_captured());
    assert_eq!(session.wait(), SessionState::Finished(Some(0)));
    assert!(session.drain().is_empty());
    assert!(marker.exists());
}

#[test]
fn failed_launch_leaves_catalog_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = catalog_with_shell(dir.path());
    let mut script =
        ScriptDescriptor::new("broken", dir.path().join("x.py"), ScriptKind::Interpreted);
    script.env = Some("missing".to_string());
    catalog.add_script(script.clone()).unwrap();

    let request = LaunchRequest {
        arguments: "--x".to_string(),
        ..Default::default()
    };
    assert!(Launcher::default().run(&script, catalog.environments(), &request).is_err());
    let stored = catalog.find_script("broken", None).unwrap();
    assert_eq!(stored.defaults.arguments, None);
    assert_eq!(stored.env.as_deref(), Some("missing"));
}
