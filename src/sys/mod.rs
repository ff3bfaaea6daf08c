cfg_os_poll! {
    #[cfg(unix)]
    mod unix;
    #[cfg(unix)]
    pub(crate) use self::unix::*;

    #[cfg(windows)]
    mod windows;
    #[cfg(windows)]
    pub(crate) use self::windows::*;

    #[cfg(target_os = "wasi")]
    mod wasi;
    #[cfg(target_os = "wasi")]
    pub(crate) use self::wasi::*;
}

cfg_not_os_poll! {
    mod shell;
    pub(crate) use self::shell::*;

    #[cfg(all(unix, feature = "os-ext"))]
    mod unix;
    #[cfg(all(unix, feature = "os-ext"))]
    pub(crate) use self::unix::SourceFd;
}
