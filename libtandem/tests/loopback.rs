// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runs a coordinator and two participants over loopback TCP in one process.

use std::fs;
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tandem::node::{
    CoordinatorNode, CoordinatorSettings, Node, ParticipantNode, ParticipantSettings,
};
use tandem::SystemStatus;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

struct Participant {
    node: ParticipantNode,
    storage: PathBuf,
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn participant(dir: &Path, name: &str, inventory: &str) -> (Participant, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let config = write(
        dir,
        &format!("{}.txt", name),
        &format!("{}\n{}", address, inventory),
    );
    let storage = dir.join(format!("storage-{}.txt", name));

    let node = ParticipantNode::with_listener(
        ParticipantSettings {
            config_path: config,
            storage_path: storage.clone(),
            log_path: dir.join(format!("log-{}.txt", name)),
            processing_delay: Duration::ZERO,
        },
        listener,
    )
    .unwrap();

    (Participant { node, storage }, address)
}

fn coordinator_settings(
    dir: &Path,
    hotel: SocketAddr,
    concert: SocketAddr,
    bookings: &str,
) -> CoordinatorSettings {
    let bookings = write(dir, "bookings.txt", bookings);
    let config = write(
        dir,
        "coordinator.txt",
        &format!("{}\n{}\n{}\n", hotel, concert, bookings.display()),
    );

    CoordinatorSettings {
        config_path: config,
        log_path: dir.join("log-coordinator.txt"),
        output_path: dir.join("output.txt"),
        response_timeout: Duration::from_secs(2),
        pacing: Duration::ZERO,
    }
}

fn finish(mut participant: Participant) -> String {
    let deadline = Instant::now() + WAIT;
    while !participant.node.lifecycle().is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(participant.node.lifecycle().is_finished());
    participant.node.shutdown().unwrap();

    fs::read_to_string(&participant.storage).unwrap()
}

fn standard_setup(dir: &TempDir) -> (Participant, Participant, CoordinatorSettings) {
    let (hotel, hotel_address) = participant(dir.path(), "hotel", "1 5\n2 5\n");
    let (concert, concert_address) = participant(dir.path(), "concert", "1 5\n2 5\n3 1\n");
    let settings = coordinator_settings(
        dir.path(),
        hotel_address,
        concert_address,
        "1 2 [1 2]\n2 2 [3]\n3 1 [1]\n",
    );
    (hotel, concert, settings)
}

/// Every request is resolved in order; only unanimous yes votes change the ledgers.
#[test]
fn bookings_commit_and_roll_back() {
    let dir = tempfile::tempdir().unwrap();
    let (hotel, concert, settings) = standard_setup(&dir);

    let mut coordinator = CoordinatorNode::start(settings.clone()).unwrap();
    coordinator.wait().unwrap();
    assert!(coordinator.lifecycle().is_finished());
    coordinator.shutdown().unwrap();

    assert_eq!(
        fs::read_to_string(&settings.output_path).unwrap(),
        "1 Success\n2 Fail\n3 Success\n"
    );
    assert_eq!(
        fs::read_to_string(&settings.log_path).unwrap(),
        format!("{}\n3\n3\n", settings.config_path.display())
    );

    assert_eq!(finish(hotel), "1 2\n2 3\n");
    assert_eq!(finish(concert), "1 2\n2 3\n3 1\n");
}

/// A participant that never answers fails the transaction without advancing the cursor.
#[test]
fn silent_participant_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let (hotel, hotel_address) = participant(dir.path(), "hotel", "1 5\n");
    let silent = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut settings = coordinator_settings(
        dir.path(),
        hotel_address,
        silent.local_addr().unwrap(),
        "1 2 [1]\n",
    );
    settings.response_timeout = Duration::from_millis(500);

    let mut coordinator = CoordinatorNode::start(settings.clone()).unwrap();
    coordinator.wait().unwrap();
    coordinator.shutdown().unwrap();

    assert_eq!(fs::read_to_string(&settings.output_path).unwrap(), "1 Fail\n");
    assert_eq!(
        fs::read_to_string(&settings.log_path).unwrap(),
        format!("{}\n0\n1\n", settings.config_path.display())
    );
    assert_eq!(finish(hotel), "1 5\n");
}

/// A coordinator process started in recovery skips the requests its log has consumed.
#[test]
fn resumed_coordinator_skips_consumed_requests() {
    let dir = tempfile::tempdir().unwrap();
    let (hotel, concert, settings) = standard_setup(&dir);

    fs::write(
        &settings.log_path,
        format!("{}\n1\n2\n", settings.config_path.display()),
    )
    .unwrap();
    fs::write(&settings.output_path, "1 Success\n2 Fail\n").unwrap();

    let mut coordinator = CoordinatorNode::resume(settings.clone()).unwrap();
    coordinator.wait().unwrap();
    coordinator.shutdown().unwrap();

    assert_eq!(
        fs::read_to_string(&settings.output_path).unwrap(),
        "1 Success\n2 Fail\n3 Success\n"
    );
    assert_eq!(
        fs::read_to_string(&settings.log_path).unwrap(),
        format!("{}\n2\n3\n", settings.config_path.display())
    );

    assert_eq!(finish(hotel), "1 4\n2 5\n");
    assert_eq!(finish(concert), "1 4\n2 5\n3 1\n");
}

/// A simulated crash and recovery leaves exactly one outcome per request.
#[test]
fn coordinator_fail_and_recover() {
    let dir = tempfile::tempdir().unwrap();
    let (hotel, concert, mut settings) = standard_setup(&dir);
    settings.pacing = Duration::from_millis(300);

    let mut coordinator = CoordinatorNode::start(settings.clone()).unwrap();
    thread::sleep(Duration::from_millis(150));
    coordinator.fail().unwrap();
    thread::sleep(Duration::from_millis(200));
    coordinator.recover().unwrap();
    coordinator.wait().unwrap();
    coordinator.shutdown().unwrap();

    assert_eq!(
        fs::read_to_string(&settings.output_path).unwrap(),
        "1 Success\n2 Fail\n3 Success\n"
    );
    assert_eq!(finish(hotel), "1 2\n2 3\n");
    assert_eq!(finish(concert), "1 2\n2 3\n3 1\n");
}

fn wait_for_file(path: &Path, expected: &str) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if fs::read_to_string(path).map(|contents| contents == expected).unwrap_or(false) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

/// A participant that crashes between transactions resumes from its committed snapshot, and
/// later requests are voted on and applied against that ledger.
#[test]
fn participant_fail_and_recover() {
    let dir = tempfile::tempdir().unwrap();
    let (mut hotel, concert, mut settings) = standard_setup(&dir);
    settings.pacing = Duration::from_millis(1500);

    let mut coordinator = CoordinatorNode::start(settings.clone()).unwrap();
    assert!(wait_for_file(
        &settings.log_path,
        &format!("{}\n1\n1\n", settings.config_path.display())
    ));
    assert_eq!(fs::read_to_string(&hotel.storage).unwrap(), "1 3\n2 3\n");

    hotel.node.fail().unwrap();
    assert!(hotel.node.lifecycle().is(SystemStatus::Failed));
    assert_eq!(
        fs::read_to_string(dir.path().join("log-hotel.txt")).unwrap(),
        format!("{}\n", dir.path().join("hotel.txt").display())
    );

    hotel.node.recover().unwrap();
    assert!(hotel.node.lifecycle().is(SystemStatus::Normal));

    coordinator.wait().unwrap();
    coordinator.shutdown().unwrap();

    assert_eq!(
        fs::read_to_string(&settings.output_path).unwrap(),
        "1 Success\n2 Fail\n3 Success\n"
    );
    // Started over from the configured inventory, the hotel would end at 1 4 and 2 5.
    assert_eq!(finish(hotel), "1 2\n2 3\n");
    assert_eq!(finish(concert), "1 2\n2 3\n3 1\n");
}
